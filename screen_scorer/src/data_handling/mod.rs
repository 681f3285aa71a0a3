pub mod count_table;
pub mod frequency_table;
pub mod normalized_table;
pub mod reference_catalog;
pub mod snv_table;
pub mod stat_table;

use polars::prelude::*;

use crate::errors::ScreenResult;
use crate::helper_functions::{has_column, str_column};
use crate::models::VariantIdentity;

pub const AA_VAR_COL: &str = "AA_var";
pub const SNV_VAR_COL: &str = "SNV_var";

/// Optional `AA_var`/`SNV_var` pair carried by catalogs and the tables derived
/// from them. Rows with both fields empty (e.g. the wild-type row) get `None`.
pub(crate) fn identity_columns(
    df: &DataFrame,
    table: &str,
) -> ScreenResult<Vec<Option<VariantIdentity>>> {
    if !(has_column(df, AA_VAR_COL) && has_column(df, SNV_VAR_COL)) {
        return Ok(vec![None; df.height()]);
    }
    let aa = str_column(df, AA_VAR_COL, table)?;
    let snv = str_column(df, SNV_VAR_COL, table)?;
    Ok(aa
        .into_iter()
        .zip(snv)
        .map(|(aa_var, snv_var)| {
            if aa_var.is_empty() && snv_var.is_empty() {
                None
            } else {
                Some(VariantIdentity { aa_var, snv_var })
            }
        })
        .collect())
}

/// Appends `AA_var`/`SNV_var` columns when any row carries an identity.
pub(crate) fn push_identity_columns<'a, I>(columns: &mut Vec<Column>, identities: I)
where
    I: Iterator<Item = Option<&'a VariantIdentity>> + Clone,
{
    if identities.clone().all(|i| i.is_none()) {
        return;
    }
    let aa: Vec<String> = identities
        .clone()
        .map(|i| i.map(|v| v.aa_var.clone()).unwrap_or_default())
        .collect();
    let snv: Vec<String> = identities
        .map(|i| i.map(|v| v.snv_var.clone()).unwrap_or_default())
        .collect();
    columns.push(Column::new(AA_VAR_COL.into(), aa));
    columns.push(Column::new(SNV_VAR_COL.into(), snv));
}

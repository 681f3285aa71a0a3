use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::data_handling::snv_table::{CONTROL_COL, TEST_COL};
use crate::data_handling::{AA_VAR_COL, SNV_VAR_COL};
use crate::errors::ScreenResult;
use crate::helper_functions::{f64_column, i64_column, read_csv, require_columns, str_column};
use crate::models::{Dataset, MutType, NormalizedVariant};

pub const RAW_LFC_COL: &str = "raw_LFC";
pub const VAR_POS_COL: &str = "var_pos";
pub const MUT_TYPE_COL: &str = "mut_type";
pub const LWS_REG_COL: &str = "lws_reg";
pub const NORMALIZED_LFC_COL: &str = "normalized_LFC";

const TABLE: &str = "normalized table";

/// Position-corrected scores of one replicate, written by the `normalize` stage.
pub struct NormalizedTableFile {
    pub path: PathBuf,
}

impl Dataset for NormalizedTableFile {
    type Output = Vec<NormalizedVariant>;

    fn load(&self) -> ScreenResult<DataFrame> {
        info!("Reading normalized scores from {}", self.path.display());
        Ok(read_csv(&self.path)?)
    }

    fn parse(df: DataFrame) -> ScreenResult<Vec<NormalizedVariant>> {
        require_columns(
            &df,
            &[SNV_VAR_COL, AA_VAR_COL, RAW_LFC_COL, VAR_POS_COL, MUT_TYPE_COL, NORMALIZED_LFC_COL],
            TABLE,
        )?;
        let snv = str_column(&df, SNV_VAR_COL, TABLE)?;
        let aa = str_column(&df, AA_VAR_COL, TABLE)?;
        let control = f64_column(&df, CONTROL_COL, TABLE)?;
        let test = f64_column(&df, TEST_COL, TABLE)?;
        let raw = f64_column(&df, RAW_LFC_COL, TABLE)?;
        let pos = i64_column(&df, VAR_POS_COL, TABLE)?;
        let mut_types = str_column(&df, MUT_TYPE_COL, TABLE)?;
        let lws = f64_column(&df, LWS_REG_COL, TABLE)?;
        let norm = f64_column(&df, NORMALIZED_LFC_COL, TABLE)?;

        let mut rows = Vec::with_capacity(df.height());
        for (i, (snv_var, aa_var)) in snv.into_iter().zip(aa).enumerate() {
            rows.push(NormalizedVariant {
                snv_var,
                aa_var,
                control: control[i],
                test: test[i],
                raw_lfc: raw[i],
                var_pos: pos[i],
                mut_type: mut_types[i].parse::<MutType>()?,
                lws_reg: lws[i],
                normalized_lfc: norm[i],
            });
        }
        Ok(rows)
    }
}

pub fn normalized_frame(rows: &[NormalizedVariant]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(SNV_VAR_COL.into(), rows.iter().map(|r| r.snv_var.clone()).collect::<Vec<_>>()),
        Column::new(AA_VAR_COL.into(), rows.iter().map(|r| r.aa_var.clone()).collect::<Vec<_>>()),
        Column::new(CONTROL_COL.into(), rows.iter().map(|r| r.control).collect::<Vec<f64>>()),
        Column::new(TEST_COL.into(), rows.iter().map(|r| r.test).collect::<Vec<f64>>()),
        Column::new(RAW_LFC_COL.into(), rows.iter().map(|r| r.raw_lfc).collect::<Vec<f64>>()),
        Column::new(VAR_POS_COL.into(), rows.iter().map(|r| r.var_pos).collect::<Vec<i64>>()),
        Column::new(MUT_TYPE_COL.into(), rows.iter().map(|r| r.mut_type.to_string()).collect::<Vec<_>>()),
        Column::new(LWS_REG_COL.into(), rows.iter().map(|r| r.lws_reg).collect::<Vec<f64>>()),
        Column::new(NORMALIZED_LFC_COL.into(), rows.iter().map(|r| r.normalized_lfc).collect::<Vec<f64>>()),
    ])
}

use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::data_handling::count_table::COUNT_COL;
use crate::data_handling::reference_catalog::{LABEL_COL, REFSEQ_COL};
use crate::data_handling::{identity_columns, push_identity_columns};
use crate::errors::ScreenResult;
use crate::helper_functions::{count_column, f64_column, read_csv, require_columns, str_column};
use crate::models::{Dataset, StatRecord};

pub const EDITED_WT_COL: &str = "Edited_WT_count";
pub const RPM_COL: &str = "RPM";
pub const BACKGROUND_SYN_COL: &str = "UE_SynPE_count";
pub const BACKGROUND_WT_COL: &str = "UE_WT_count";
pub const OR_COL: &str = "OR";
pub const PVALUE_COL: &str = "pvalue";

const TABLE: &str = "stat table";

/// Sample-versus-background statistics written by the `stats` stage.
pub struct StatTableFile {
    pub path: PathBuf,
}

impl Dataset for StatTableFile {
    type Output = Vec<StatRecord>;

    fn load(&self) -> ScreenResult<DataFrame> {
        info!("Reading variant statistics from {}", self.path.display());
        Ok(read_csv(&self.path)?)
    }

    fn parse(df: DataFrame) -> ScreenResult<Vec<StatRecord>> {
        require_columns(
            &df,
            &[REFSEQ_COL, LABEL_COL, COUNT_COL, RPM_COL, OR_COL, PVALUE_COL],
            TABLE,
        )?;
        let ref_seqs = str_column(&df, REFSEQ_COL, TABLE)?;
        let labels = str_column(&df, LABEL_COL, TABLE)?;
        let identities = identity_columns(&df, TABLE)?;
        let counts = count_column(&df, COUNT_COL, TABLE)?;
        let rpm = f64_column(&df, RPM_COL, TABLE)?;
        let odds = f64_column(&df, OR_COL, TABLE)?;
        let pvalues = f64_column(&df, PVALUE_COL, TABLE)?;
        let edited_wt = count_column(&df, EDITED_WT_COL, TABLE)?;
        let bg_syn = count_column(&df, BACKGROUND_SYN_COL, TABLE)?;
        let bg_wt = count_column(&df, BACKGROUND_WT_COL, TABLE)?;

        let mut records = Vec::with_capacity(df.height());
        for (i, ((ref_seq, label), identity)) in ref_seqs
            .into_iter()
            .zip(labels)
            .zip(identities)
            .enumerate()
        {
            records.push(StatRecord {
                ref_seq,
                label,
                identity,
                count: counts[i],
                rpm: rpm[i],
                odds_ratio: odds[i],
                p_value: pvalues[i],
                edited_wt_count: edited_wt[i],
                background_syn_count: bg_syn[i],
                background_wt_count: bg_wt[i],
            });
        }
        Ok(records)
    }
}

pub fn stat_frame(records: &[StatRecord]) -> PolarsResult<DataFrame> {
    let mut columns = vec![
        Column::new(REFSEQ_COL.into(), records.iter().map(|r| r.ref_seq.clone()).collect::<Vec<_>>()),
        Column::new(LABEL_COL.into(), records.iter().map(|r| r.label.clone()).collect::<Vec<_>>()),
    ];
    push_identity_columns(&mut columns, records.iter().map(|r| r.identity.as_ref()));
    columns.extend([
        Column::new(COUNT_COL.into(), records.iter().map(|r| r.count).collect::<Vec<u64>>()),
        Column::new(EDITED_WT_COL.into(), records.iter().map(|r| r.edited_wt_count).collect::<Vec<u64>>()),
        Column::new(RPM_COL.into(), records.iter().map(|r| r.rpm).collect::<Vec<f64>>()),
        Column::new(BACKGROUND_SYN_COL.into(), records.iter().map(|r| r.background_syn_count).collect::<Vec<u64>>()),
        Column::new(BACKGROUND_WT_COL.into(), records.iter().map(|r| r.background_wt_count).collect::<Vec<u64>>()),
        Column::new(OR_COL.into(), records.iter().map(|r| r.odds_ratio).collect::<Vec<f64>>()),
        Column::new(PVALUE_COL.into(), records.iter().map(|r| r.p_value).collect::<Vec<f64>>()),
    ]);
    DataFrame::new(columns)
}

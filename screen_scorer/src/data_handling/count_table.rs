use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::data_handling::reference_catalog::{LABEL_COL, REFSEQ_COL};
use crate::data_handling::{identity_columns, push_identity_columns};
use crate::errors::ScreenResult;
use crate::helper_functions::{count_column, read_csv, require_columns, str_column};
use crate::models::{Dataset, VariantCount};

pub const COUNT_COL: &str = "count";
pub const FREQUENCY_COL: &str = "frequency";

const TABLE: &str = "count table";

/// Per-variant read counts written by the `count` stage.
pub struct CountTableFile {
    pub path: PathBuf,
}

impl Dataset for CountTableFile {
    type Output = Vec<VariantCount>;

    fn load(&self) -> ScreenResult<DataFrame> {
        info!("Reading variant counts from {}", self.path.display());
        Ok(read_csv(&self.path)?)
    }

    fn parse(df: DataFrame) -> ScreenResult<Vec<VariantCount>> {
        require_columns(&df, &[REFSEQ_COL, LABEL_COL, COUNT_COL], TABLE)?;
        let ref_seqs = str_column(&df, REFSEQ_COL, TABLE)?;
        let labels = str_column(&df, LABEL_COL, TABLE)?;
        let counts = count_column(&df, COUNT_COL, TABLE)?;
        let identities = identity_columns(&df, TABLE)?;

        Ok(ref_seqs
            .into_iter()
            .zip(labels)
            .zip(identities)
            .zip(counts)
            .map(|(((ref_seq, label), identity), count)| VariantCount {
                ref_seq,
                label,
                identity,
                count,
            })
            .collect())
    }
}

/// Column order: RefSeq, Label, [AA_var, SNV_var], count, [frequency].
/// `total_reads` adds the frequency column (`count / total_reads`).
pub fn count_frame(records: &[VariantCount], total_reads: Option<u64>) -> PolarsResult<DataFrame> {
    let mut columns = vec![
        Column::new(
            REFSEQ_COL.into(),
            records.iter().map(|r| r.ref_seq.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            LABEL_COL.into(),
            records.iter().map(|r| r.label.clone()).collect::<Vec<_>>(),
        ),
    ];
    push_identity_columns(&mut columns, records.iter().map(|r| r.identity.as_ref()));
    columns.push(Column::new(
        COUNT_COL.into(),
        records.iter().map(|r| r.count).collect::<Vec<u64>>(),
    ));
    if let Some(total) = total_reads {
        let frequency: Vec<f64> = records
            .iter()
            .map(|r| if total == 0 { 0.0 } else { r.count as f64 / total as f64 })
            .collect();
        columns.push(Column::new(FREQUENCY_COL.into(), frequency));
    }
    DataFrame::new(columns)
}

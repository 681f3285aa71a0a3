use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, error, info};

use crate::errors::ScreenResult;
use crate::helper_functions::{count_column, f64_column, has_column, read_tsv, require_columns, str_column};
use crate::models::{Dataset, FrequencyRow};

pub const ALIGNED_COL: &str = "Aligned_Sequence";
pub const REFERENCE_COL: &str = "Reference_Sequence";
pub const READS_COL: &str = "#Reads";
pub const PERCENT_COL: &str = "%Reads";

const TABLE: &str = "frequency table";

/// Tab-separated allele frequency table emitted by the aligner.
pub struct FrequencyTable {
    pub path: PathBuf,
}

impl FrequencyTable {
    /// Rows for read classification, which also needs the reference column.
    pub fn read_alignments(&self) -> ScreenResult<Vec<FrequencyRow>> {
        let df = self.load()?;
        require_columns(&df, &[ALIGNED_COL, REFERENCE_COL, READS_COL], TABLE)?;
        Self::parse(df)
    }
}

impl Dataset for FrequencyTable {
    type Output = Vec<FrequencyRow>;

    fn load(&self) -> ScreenResult<DataFrame> {
        info!("Reading frequency table from {}", self.path.display());
        let df = match read_tsv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read frequency table: {}", e);
                return Err(e.into());
            }
        };
        debug!("Loaded {} rows", df.height());
        Ok(df)
    }

    fn parse(df: DataFrame) -> ScreenResult<Vec<FrequencyRow>> {
        require_columns(&df, &[ALIGNED_COL, READS_COL], TABLE)?;
        let aligned = str_column(&df, ALIGNED_COL, TABLE)?;
        let reads = count_column(&df, READS_COL, TABLE)?;
        let reference = if has_column(&df, REFERENCE_COL) {
            str_column(&df, REFERENCE_COL, TABLE)?
        } else {
            vec![String::new(); df.height()]
        };
        let percent: Vec<Option<f64>> = if has_column(&df, PERCENT_COL) {
            f64_column(&df, PERCENT_COL, TABLE)?.into_iter().map(Some).collect()
        } else {
            vec![None; df.height()]
        };

        Ok(aligned
            .into_iter()
            .zip(reference)
            .zip(reads)
            .zip(percent)
            .enumerate()
            .map(|(row_id, (((aligned, reference), reads), percent))| FrequencyRow {
                row_id,
                aligned,
                reference,
                reads,
                percent,
            })
            .collect())
    }
}

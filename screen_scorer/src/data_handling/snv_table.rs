use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::data_handling::{AA_VAR_COL, SNV_VAR_COL};
use crate::errors::ScreenResult;
use crate::helper_functions::{f64_column, read_csv, require_columns, str_column};
use crate::models::{Dataset, SnvAggregate};

pub const CONTROL_COL: &str = "control";
pub const TEST_COL: &str = "test";

const TABLE: &str = "SNV table";

/// Control/test read rates per nucleotide variant, one file per replicate.
pub struct SnvTableFile {
    pub path: PathBuf,
}

impl Dataset for SnvTableFile {
    type Output = Vec<SnvAggregate>;

    fn load(&self) -> ScreenResult<DataFrame> {
        info!("Reading SNV rates from {}", self.path.display());
        Ok(read_csv(&self.path)?)
    }

    fn parse(df: DataFrame) -> ScreenResult<Vec<SnvAggregate>> {
        require_columns(&df, &[SNV_VAR_COL, AA_VAR_COL, CONTROL_COL, TEST_COL], TABLE)?;
        let snv = str_column(&df, SNV_VAR_COL, TABLE)?;
        let aa = str_column(&df, AA_VAR_COL, TABLE)?;
        let control = f64_column(&df, CONTROL_COL, TABLE)?;
        let test = f64_column(&df, TEST_COL, TABLE)?;

        Ok(snv
            .into_iter()
            .zip(aa)
            .zip(control.into_iter().zip(test))
            .map(|((snv_var, aa_var), (control, test))| SnvAggregate {
                snv_var,
                aa_var,
                control,
                test,
            })
            .collect())
    }
}

pub fn snv_frame(rows: &[SnvAggregate]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(SNV_VAR_COL.into(), rows.iter().map(|r| r.snv_var.clone()).collect::<Vec<_>>()),
        Column::new(AA_VAR_COL.into(), rows.iter().map(|r| r.aa_var.clone()).collect::<Vec<_>>()),
        Column::new(CONTROL_COL.into(), rows.iter().map(|r| r.control).collect::<Vec<f64>>()),
        Column::new(TEST_COL.into(), rows.iter().map(|r| r.test).collect::<Vec<f64>>()),
    ])
}

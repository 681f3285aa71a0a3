use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, error, info};

use crate::data_handling::identity_columns;
use crate::errors::{ScreenError, ScreenResult};
use crate::helper_functions::{read_csv, require_columns, str_column};
use crate::models::{CatalogEntry, Dataset, ReferenceCatalog};

pub const REFSEQ_COL: &str = "RefSeq";
pub const LABEL_COL: &str = "Label";

const TABLE: &str = "reference catalog";

/// Comma-separated catalog of expected sequences (`RefSeq`, `Label` and,
/// for variant libraries, `AA_var`/`SNV_var`). Also used as the whitelist
/// for read classification.
pub struct ReferenceCatalogFile {
    pub path: PathBuf,
}

impl Dataset for ReferenceCatalogFile {
    type Output = ReferenceCatalog;

    fn load(&self) -> ScreenResult<DataFrame> {
        info!("Reading reference catalog from {}", self.path.display());
        match read_csv(&self.path) {
            Ok(df) => Ok(df),
            Err(e) => {
                error!("Failed to read reference catalog: {}", e);
                Err(e.into())
            }
        }
    }

    fn parse(df: DataFrame) -> ScreenResult<ReferenceCatalog> {
        require_columns(&df, &[REFSEQ_COL, LABEL_COL], TABLE)?;
        let ref_seqs = str_column(&df, REFSEQ_COL, TABLE)?;
        let labels = str_column(&df, LABEL_COL, TABLE)?;
        let identities = identity_columns(&df, TABLE)?;

        let entries: Vec<CatalogEntry> = ref_seqs
            .into_iter()
            .zip(labels)
            .zip(identities)
            .map(|((ref_seq, label), identity)| CatalogEntry {
                ref_seq,
                label,
                identity,
            })
            .collect();
        debug!("Catalog holds {} reference sequences", entries.len());

        let catalog = ReferenceCatalog::new(entries)?;
        if catalog.is_empty() {
            return Err(ScreenError::DataInsufficient(
                "reference catalog has no entries".to_string(),
            ));
        }
        Ok(catalog)
    }
}

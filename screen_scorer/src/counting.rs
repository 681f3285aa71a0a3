use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::data_handling::count_table::count_frame;
use crate::data_handling::frequency_table::FrequencyTable;
use crate::errors::ScreenResult;
use crate::helper_functions::sample_name;
use crate::models::{Dataset, FrequencyRow, ReferenceCatalog, VariantCount, UNMATCHED_KEY};

/// Per-catalog read counts of one sample plus the unmatched bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct CountResult {
    /// One record per catalog entry, in catalog order, followed by the
    /// `No_matched` record unless the catalog already provides one.
    pub records: Vec<VariantCount>,
    pub unmatched: u64,
    pub total_reads: u64,
}

impl CountResult {
    pub fn to_frame(&self, with_frequency: bool) -> PolarsResult<DataFrame> {
        count_frame(&self.records, with_frequency.then_some(self.total_reads))
    }

    pub fn count_of(&self, ref_seq: &str) -> Option<u64> {
        self.records.iter().find(|r| r.ref_seq == ref_seq).map(|r| r.count)
    }
}

struct Tally {
    matched: Vec<u64>,
    unmatched: u64,
    total: u64,
}

/// Collapses aligned reads onto the catalog by exact sequence match. Reads
/// whose sequence is not catalogued land in the unmatched bucket, which is
/// provisioned up front so no read can be dropped.
pub fn aggregate_counts(rows: &[FrequencyRow], catalog: &ReferenceCatalog) -> CountResult {
    let unmatched_slot = catalog.position(UNMATCHED_KEY);

    let tally = rows.iter().fold(
        Tally {
            matched: vec![0; catalog.len()],
            unmatched: 0,
            total: 0,
        },
        |mut t, row| {
            t.total += row.reads;
            match catalog.position(&row.aligned) {
                Some(i) if Some(i) != unmatched_slot => t.matched[i] += row.reads,
                _ => t.unmatched += row.reads,
            }
            t
        },
    );

    let mut records: Vec<VariantCount> = catalog
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| VariantCount {
            ref_seq: entry.ref_seq.clone(),
            label: entry.label.clone(),
            identity: entry.identity.clone(),
            count: if Some(i) == unmatched_slot {
                tally.unmatched
            } else {
                tally.matched[i]
            },
        })
        .collect();

    if unmatched_slot.is_none() {
        records.push(VariantCount {
            ref_seq: UNMATCHED_KEY.to_string(),
            label: UNMATCHED_KEY.to_string(),
            identity: None,
            count: tally.unmatched,
        });
    }

    debug!(
        "Matched {} of {} reads ({} unmatched)",
        tally.total - tally.unmatched,
        tally.total,
        tally.unmatched
    );

    CountResult {
        records,
        unmatched: tally.unmatched,
        total_reads: tally.total,
    }
}

/// Loads one sample's frequency table and aggregates it against `catalog`.
pub fn count_sample(freq_table: &Path, catalog: &ReferenceCatalog) -> ScreenResult<CountResult> {
    let name = sample_name(freq_table);
    info!("[{}] Counting reads over {} catalog variants", name, catalog.len());

    let rows = FrequencyTable {
        path: freq_table.to_path_buf(),
    }
    .read()?;
    let result = aggregate_counts(&rows, catalog);

    info!(
        "[{}] {} reads, {} unmatched",
        name, result.total_reads, result.unmatched
    );
    Ok(result)
}

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::data_handling::count_table::CountTableFile;
use crate::errors::{ScreenError, ScreenResult};
use crate::fisher::fisher_exact_two_sided;
use crate::helper_functions::sample_name;
use crate::models::{Dataset, StatRecord, VariantCount, SYN_PE_LABEL, WT_LABEL};

/// Haldane-Anscombe corrected odds ratio. The +1 is applied to every cell,
/// so the ratio is always finite and positive.
pub fn odds_ratio(test_count: u64, test_wt: u64, bg_count: u64, bg_wt: u64) -> f64 {
    let test = (test_count as f64 + 1.0) / (test_wt as f64 + 1.0);
    let bg = (bg_count as f64 + 1.0) / (bg_wt as f64 + 1.0);
    test / bg
}

/// Reads per million over all SynPE reads of the sample; zero when the
/// sample has no SynPE reads at all.
pub fn reads_per_million(count: u64, syn_total: u64) -> f64 {
    if syn_total == 0 {
        0.0
    } else {
        count as f64 * 1_000_000.0 / syn_total as f64
    }
}

pub fn syn_pe_total(table: &[VariantCount]) -> u64 {
    table
        .iter()
        .filter(|r| r.label == SYN_PE_LABEL)
        .map(|r| r.count)
        .sum()
}

fn wt_count(table: &[VariantCount], which: &str) -> ScreenResult<u64> {
    table
        .iter()
        .find(|r| r.label == WT_LABEL)
        .map(|r| r.count)
        .ok_or_else(|| {
            ScreenError::UnmatchedKey(format!("no `{}` row in {} counts", WT_LABEL, which))
        })
}

/// Both tables must list the same RefSeqs in the same order.
fn check_same_variants(sample: &[VariantCount], background: &[VariantCount]) -> ScreenResult<()> {
    if sample.len() != background.len() {
        return Err(ScreenError::SchemaMismatch(format!(
            "sample has {} variants, background has {}",
            sample.len(),
            background.len()
        )));
    }
    if let Some((i, (s, b))) = sample
        .iter()
        .zip(background)
        .enumerate()
        .find(|(_, (s, b))| s.ref_seq != b.ref_seq)
    {
        return Err(ScreenError::SchemaMismatch(format!(
            "RefSeq differs between sample and background at row {} (`{}` vs `{}`)",
            i, s.ref_seq, b.ref_seq
        )));
    }
    Ok(())
}

/// Odds ratio, Fisher p-value and RPM of every SynPE variant in `sample`
/// relative to the unedited `background`.
pub fn background_statistics(
    sample: &[VariantCount],
    background: &[VariantCount],
) -> ScreenResult<Vec<StatRecord>> {
    check_same_variants(sample, background)?;

    let bg_wt = wt_count(background, "background")?;
    let test_wt = wt_count(sample, "sample")?;

    let bg_syn: HashMap<&str, u64> = background
        .iter()
        .filter(|r| r.label == SYN_PE_LABEL)
        .map(|r| (r.ref_seq.as_str(), r.count))
        .collect();

    let syn_total = syn_pe_total(sample);
    if syn_total == 0 {
        warn!("Sample has no SynPE reads; every RPM is 0");
    }
    debug!(
        "WT reads: sample {}, background {}; SynPE reads in sample: {}",
        test_wt, bg_wt, syn_total
    );

    let mut records = Vec::new();
    for row in sample.iter().filter(|r| r.label == SYN_PE_LABEL) {
        let bg_count = *bg_syn.get(row.ref_seq.as_str()).ok_or_else(|| {
            ScreenError::UnmatchedKey(format!(
                "SynPE variant `{}` is not labelled SynPE in the background",
                row.ref_seq
            ))
        })?;

        records.push(StatRecord {
            ref_seq: row.ref_seq.clone(),
            label: row.label.clone(),
            identity: row.identity.clone(),
            count: row.count,
            rpm: reads_per_million(row.count, syn_total),
            odds_ratio: odds_ratio(row.count, test_wt, bg_count, bg_wt),
            p_value: fisher_exact_two_sided(row.count, bg_count, test_wt, bg_wt)?,
            edited_wt_count: test_wt,
            background_syn_count: bg_count,
            background_wt_count: bg_wt,
        });
    }
    Ok(records)
}

/// File-level entry point of the `stats` stage.
pub fn run_statistics(sample: &Path, background: &Path) -> ScreenResult<Vec<StatRecord>> {
    info!(
        "Analysis: {} against background {}",
        sample_name(sample),
        sample_name(background)
    );
    let sample_counts = CountTableFile { path: sample.to_path_buf() }.read()?;
    let background_counts = CountTableFile { path: background.to_path_buf() }.read()?;
    let records = background_statistics(&sample_counts, &background_counts)?;
    info!("Computed statistics for {} SynPE variants", records.len());
    Ok(records)
}

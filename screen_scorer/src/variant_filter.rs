use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::background_stats::{reads_per_million, syn_pe_total};
use crate::config::ScreenConfig;
use crate::data_handling::count_table::CountTableFile;
use crate::data_handling::stat_table::StatTableFile;
use crate::data_handling::SNV_VAR_COL;
use crate::errors::{missing_column, ScreenResult};
use crate::models::{Dataset, SnvAggregate, StatRecord, VariantCount, SYN_PE_LABEL};

/// Significance cutoffs applied to each replicate independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCutoffs {
    pub or_cutoff: f64,
    pub p_cutoff: f64,
    pub rpm_cutoff: f64,
}

impl From<&ScreenConfig> for FilterCutoffs {
    fn from(config: &ScreenConfig) -> Self {
        FilterCutoffs {
            or_cutoff: config.or_cutoff,
            p_cutoff: config.p_cutoff,
            rpm_cutoff: config.rpm_cutoff,
        }
    }
}

impl Default for FilterCutoffs {
    fn default() -> Self {
        FilterCutoffs::from(&ScreenConfig::default())
    }
}

impl FilterCutoffs {
    /// Strict on odds ratio and p-value, inclusive on RPM.
    pub fn passes(&self, record: &StatRecord) -> bool {
        record.odds_ratio > self.or_cutoff
            && record.p_value < self.p_cutoff
            && record.rpm >= self.rpm_cutoff
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// RefSeqs significant in both replicates, in replicate-1 order.
    pub kept: Vec<String>,
    pub replicate_1: Vec<SnvAggregate>,
    pub replicate_2: Vec<SnvAggregate>,
    /// SNVs whose contributing rows disagreed on AA_var.
    pub aa_conflicts: Vec<String>,
}

/// RefSeqs passing the cutoffs in both replicates.
pub fn significant_in_both(
    stats_1: &[StatRecord],
    stats_2: &[StatRecord],
    cutoffs: &FilterCutoffs,
) -> Vec<String> {
    let passed_2: HashSet<&str> = stats_2
        .iter()
        .filter(|r| cutoffs.passes(r))
        .map(|r| r.ref_seq.as_str())
        .collect();
    let passed_1: Vec<&StatRecord> = stats_1.iter().filter(|r| cutoffs.passes(r)).collect();
    debug!(
        "Significant variants: {} in replicate 1, {} in replicate 2",
        passed_1.len(),
        passed_2.len()
    );

    passed_1
        .into_iter()
        .filter(|r| passed_2.contains(r.ref_seq.as_str()))
        .map(|r| r.ref_seq.clone())
        .collect()
}

struct SnvGroups {
    rows: Vec<SnvAggregate>,
    index: HashMap<String, usize>,
    conflicts: Vec<String>,
}

impl SnvGroups {
    fn new() -> Self {
        SnvGroups {
            rows: Vec::new(),
            index: HashMap::new(),
            conflicts: Vec::new(),
        }
    }

    /// Sums rates into the SNV's group. The first AA_var seen for an SNV is kept.
    fn add(&mut self, snv_var: &str, aa_var: &str, control: f64, test: f64) {
        match self.index.get(snv_var) {
            Some(&i) => {
                let group = &mut self.rows[i];
                group.control += control;
                group.test += test;
                if group.aa_var != aa_var && !self.conflicts.iter().any(|s| s == snv_var) {
                    warn!(
                        "{} maps to both {} and {}; keeping {}",
                        snv_var, group.aa_var, aa_var, group.aa_var
                    );
                    self.conflicts.push(snv_var.to_string());
                }
            }
            None => {
                self.index.insert(snv_var.to_string(), self.rows.len());
                self.rows.push(SnvAggregate {
                    snv_var: snv_var.to_string(),
                    aa_var: aa_var.to_string(),
                    control,
                    test,
                });
            }
        }
    }
}

/// Control rates (RPM from the stat table) and test rates (RPM of the test
/// sample's SynPE reads) of the kept variants, summed per SNV.
fn aggregate_replicate(
    replicate: usize,
    kept: &[String],
    stats: &[StatRecord],
    test: &[VariantCount],
    groups: &mut SnvGroups,
) -> ScreenResult<()> {
    let stat_by_ref: HashMap<&str, &StatRecord> =
        stats.iter().map(|r| (r.ref_seq.as_str(), r)).collect();
    let test_syn_total = syn_pe_total(test);
    let test_by_ref: HashMap<&str, u64> = test
        .iter()
        .filter(|r| r.label == SYN_PE_LABEL)
        .map(|r| (r.ref_seq.as_str(), r.count))
        .collect();

    let mut dropped = 0usize;
    for ref_seq in kept {
        let Some(stat) = stat_by_ref.get(ref_seq.as_str()) else {
            continue;
        };
        let Some(&test_count) = test_by_ref.get(ref_seq.as_str()) else {
            dropped += 1;
            continue;
        };
        let identity = stat
            .identity
            .as_ref()
            .ok_or_else(|| missing_column(SNV_VAR_COL, "stat table"))?;

        groups.add(
            &identity.snv_var,
            &identity.aa_var,
            stat.rpm,
            reads_per_million(test_count, test_syn_total),
        );
    }
    if dropped > 0 {
        warn!(
            "Replicate {}: {} significant variants absent from the test sample were dropped",
            replicate, dropped
        );
    }
    Ok(())
}

/// Keeps variants significant in both replicates and collapses them to SNV level.
pub fn filter_variants(
    stats_1: &[StatRecord],
    stats_2: &[StatRecord],
    test_1: &[VariantCount],
    test_2: &[VariantCount],
    cutoffs: &FilterCutoffs,
) -> ScreenResult<FilterResult> {
    let kept = significant_in_both(stats_1, stats_2, cutoffs);
    info!("{} variants significant in both replicates", kept.len());

    let mut groups_1 = SnvGroups::new();
    aggregate_replicate(1, &kept, stats_1, test_1, &mut groups_1)?;
    let mut groups_2 = SnvGroups::new();
    aggregate_replicate(2, &kept, stats_2, test_2, &mut groups_2)?;

    let mut aa_conflicts = groups_1.conflicts;
    for snv in groups_2.conflicts {
        if !aa_conflicts.contains(&snv) {
            aa_conflicts.push(snv);
        }
    }
    info!(
        "Collapsed to {} / {} SNVs",
        groups_1.rows.len(),
        groups_2.rows.len()
    );

    Ok(FilterResult {
        kept,
        replicate_1: groups_1.rows,
        replicate_2: groups_2.rows,
        aa_conflicts,
    })
}

/// File-level entry point of the `filter` stage.
pub fn run_filter(
    stats: [&Path; 2],
    tests: [&Path; 2],
    cutoffs: &FilterCutoffs,
) -> ScreenResult<FilterResult> {
    let stats_1 = StatTableFile { path: stats[0].to_path_buf() }.read()?;
    let stats_2 = StatTableFile { path: stats[1].to_path_buf() }.read()?;
    let test_1 = CountTableFile { path: tests[0].to_path_buf() }.read()?;
    let test_2 = CountTableFile { path: tests[1].to_path_buf() }.read()?;
    filter_variants(&stats_1, &stats_2, &test_1, &test_2, cutoffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ScreenError;
    use crate::models::{VariantIdentity, WT_LABEL};

    fn stat(ref_seq: &str, snv: &str, aa: &str, rpm: f64, or: f64, p: f64) -> StatRecord {
        StatRecord {
            ref_seq: ref_seq.to_string(),
            label: SYN_PE_LABEL.to_string(),
            identity: Some(VariantIdentity {
                aa_var: aa.to_string(),
                snv_var: snv.to_string(),
            }),
            count: 0,
            rpm,
            odds_ratio: or,
            p_value: p,
            edited_wt_count: 0,
            background_syn_count: 0,
            background_wt_count: 0,
        }
    }

    fn vc(ref_seq: &str, label: &str, count: u64) -> VariantCount {
        VariantCount {
            ref_seq: ref_seq.to_string(),
            label: label.to_string(),
            identity: None,
            count,
        }
    }

    #[test]
    fn cutoffs_are_strict_except_rpm() {
        let c = FilterCutoffs::default();
        assert!(c.passes(&stat("a", "s", "K1N", 10.0, 2.01, 0.049)));
        assert!(!c.passes(&stat("a", "s", "K1N", 10.0, 2.0, 0.01)));
        assert!(!c.passes(&stat("a", "s", "K1N", 10.0, 3.0, 0.05)));
        assert!(!c.passes(&stat("a", "s", "K1N", 9.99, 3.0, 0.01)));
    }

    #[test]
    fn only_variants_significant_in_both_replicates_survive() {
        let good = |r: &str| stat(r, &format!("snv_{}", r), "K1N", 100.0, 5.0, 0.001);
        let bad = |r: &str| stat(r, &format!("snv_{}", r), "K1N", 100.0, 1.0, 0.9);
        let rep1 = vec![good("V1"), good("V2"), good("V3"), bad("V4")];
        let rep2 = vec![bad("V1"), good("V2"), good("V3"), good("V4")];
        let kept = significant_in_both(&rep1, &rep2, &FilterCutoffs::default());
        assert_eq!(kept, vec!["V2".to_string(), "V3".to_string()]);
    }

    #[test]
    fn codon_rows_collapse_to_snv_and_first_aa_wins() {
        let rep = vec![
            stat("C1", "pos10AG", "K4K", 100.0, 5.0, 0.001),
            stat("C2", "pos10AG", "K4R", 50.0, 5.0, 0.001),
            stat("C3", "pos11CT", "L5F", 20.0, 5.0, 0.001),
        ];
        let test = vec![
            vc("W", WT_LABEL, 1000),
            vc("C1", SYN_PE_LABEL, 30),
            vc("C2", SYN_PE_LABEL, 10),
            vc("C3", SYN_PE_LABEL, 60),
        ];
        let result = filter_variants(&rep, &rep, &test, &test, &FilterCutoffs::default()).unwrap();

        assert_eq!(result.replicate_1.len(), 2);
        let first = &result.replicate_1[0];
        assert_eq!(first.snv_var, "pos10AG");
        assert_eq!(first.aa_var, "K4K");
        assert!((first.control - 150.0).abs() < 1e-9);
        assert!((first.test - 400_000.0).abs() < 1e-6);
        assert_eq!(result.aa_conflicts, vec!["pos10AG".to_string()]);
    }

    #[test]
    fn variants_missing_from_test_sample_are_dropped() {
        let rep = vec![
            stat("C1", "pos10AG", "K4K", 100.0, 5.0, 0.001),
            stat("C3", "pos11CT", "L5F", 20.0, 5.0, 0.001),
        ];
        let test = vec![vc("W", WT_LABEL, 1000), vc("C1", SYN_PE_LABEL, 30)];
        let result = filter_variants(&rep, &rep, &test, &test, &FilterCutoffs::default()).unwrap();
        assert_eq!(result.kept.len(), 2);
        assert_eq!(result.replicate_1.len(), 1);
        assert_eq!(result.replicate_1[0].snv_var, "pos10AG");
    }

    #[test]
    fn variants_without_identity_cannot_be_aggregated() {
        let mut rec = stat("C1", "pos10AG", "K4K", 100.0, 5.0, 0.001);
        rec.identity = None;
        let test = vec![vc("C1", SYN_PE_LABEL, 30)];
        assert!(matches!(
            filter_variants(&[rec.clone()], &[rec], &test, &test, &FilterCutoffs::default()),
            Err(ScreenError::MissingColumn { .. })
        ));
    }
}

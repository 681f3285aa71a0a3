//! End-to-end scoring of one screen: an unedited background, two control
//! replicates (edited, no drug) and two test replicates (edited, drug).
//!
//! Every table is computed in memory first; files are only written once the
//! whole run has succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::background_stats::background_statistics;
use crate::config::ScreenConfig;
use crate::counting::{count_sample, CountResult};
use crate::data_handling::normalized_table::normalized_frame;
use crate::data_handling::reference_catalog::ReferenceCatalogFile;
use crate::data_handling::snv_table::snv_frame;
use crate::data_handling::stat_table::stat_frame;
use crate::errors::{ScreenError, ScreenResult};
use crate::helper_functions::{dataframe_to_csv, sample_name, write_json};
use crate::lfc_normalizer::LfcNormalizer;
use crate::models::{Dataset, NormalizedVariant, ScoreLevel, StatRecord};
use crate::variant_filter::{filter_variants, FilterCutoffs, FilterResult};
use crate::variant_scorer::{score_variants, scored_frame, QuantileCutoffs, ScoreResult, ScoreThresholds};

pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Clone)]
pub struct ScreenInputs {
    pub catalog: PathBuf,
    pub unedited: PathBuf,
    pub control: [PathBuf; 2],
    pub test: [PathBuf; 2],
}

impl ScreenInputs {
    /// Frequency tables in counting order: unedited, control 1/2, test 1/2.
    fn samples(&self) -> [&Path; 5] {
        [
            self.unedited.as_path(),
            self.control[0].as_path(),
            self.control[1].as_path(),
            self.test[0].as_path(),
            self.test[1].as_path(),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSummary {
    pub name: String,
    pub total_reads: u64,
    pub unmatched: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub config: ScreenConfig,
    pub samples: Vec<SampleSummary>,
    pub significant_variants: usize,
    pub snvs: [usize; 2],
    pub aa_conflicts: Vec<String>,
    pub snv_thresholds: ScoreThresholds,
    pub aa_thresholds: ScoreThresholds,
    pub snv_classes: BTreeMap<String, usize>,
    pub aa_classes: BTreeMap<String, usize>,
}

/// Everything a run produces, held in memory until [`ScreenRun::write`].
pub struct ScreenRun {
    pub sample_names: [String; 5],
    pub counts: Vec<CountResult>,
    pub stats: [Vec<StatRecord>; 2],
    pub filtered: FilterResult,
    pub normalized: [Vec<NormalizedVariant>; 2],
    pub snv_scores: ScoreResult,
    pub aa_scores: ScoreResult,
    pub summary: RunSummary,
}

fn class_map(result: &ScoreResult) -> BTreeMap<String, usize> {
    result
        .class_counts()
        .iter()
        .map(|(class, n)| (class.to_string(), *n))
        .collect()
}

pub fn run_screen(inputs: &ScreenInputs, config: &ScreenConfig) -> ScreenResult<ScreenRun> {
    config.validate()?;
    let catalog = ReferenceCatalogFile {
        path: inputs.catalog.clone(),
    }
    .read()?;
    info!("Catalog holds {} reference sequences", catalog.len());

    let samples = inputs.samples();
    let counts = samples
        .par_iter()
        .map(|path| count_sample(path, &catalog))
        .collect::<ScreenResult<Vec<CountResult>>>()?;
    let [unedited, control_1, control_2, test_1, test_2] = [0, 1, 2, 3, 4].map(|i| &counts[i].records);

    let stats = [
        background_statistics(control_1, unedited)?,
        background_statistics(control_2, unedited)?,
    ];

    let filtered = filter_variants(
        &stats[0],
        &stats[1],
        test_1,
        test_2,
        &FilterCutoffs::from(config),
    )?;

    let normalizer = LfcNormalizer::from_config(config)?;
    let normalized = [
        normalizer.normalize(&filtered.replicate_1)?,
        normalizer.normalize(&filtered.replicate_2)?,
    ];

    let cutoffs = QuantileCutoffs::from(config);
    let snv_scores = score_variants(&normalized[0], &normalized[1], ScoreLevel::Snv, &cutoffs)?;
    let aa_scores = score_variants(&normalized[0], &normalized[1], ScoreLevel::AminoAcid, &cutoffs)?;

    let sample_names = samples.map(sample_name);
    let summary = RunSummary {
        config: config.clone(),
        samples: sample_names
            .iter()
            .zip(&counts)
            .map(|(name, c)| SampleSummary {
                name: name.clone(),
                total_reads: c.total_reads,
                unmatched: c.unmatched,
            })
            .collect(),
        significant_variants: filtered.kept.len(),
        snvs: [filtered.replicate_1.len(), filtered.replicate_2.len()],
        aa_conflicts: filtered.aa_conflicts.clone(),
        snv_thresholds: snv_scores.thresholds,
        aa_thresholds: aa_scores.thresholds,
        snv_classes: class_map(&snv_scores),
        aa_classes: class_map(&aa_scores),
    };

    Ok(ScreenRun {
        sample_names,
        counts,
        stats,
        filtered,
        normalized,
        snv_scores,
        aa_scores,
        summary,
    })
}

impl ScreenRun {
    /// Builds every output frame, writes them into a staging directory inside
    /// `out_dir` and only then moves them into place. A failure before the
    /// move leaves `out_dir` without any of this run's files.
    pub fn write(&self, out_dir: &Path) -> ScreenResult<Vec<PathBuf>> {
        let names = &self.sample_names;
        let mut tables: Vec<(String, DataFrame)> = Vec::new();

        for (name, counts) in names.iter().zip(&self.counts) {
            tables.push((format!("{}_counts.csv", name), counts.to_frame(true)?));
        }
        for rep in 0..2 {
            let control = &names[rep + 1];
            tables.push((format!("{}_stats.csv", control), stat_frame(&self.stats[rep])?));
        }
        tables.push((format!("{}_snv.csv", names[1]), snv_frame(&self.filtered.replicate_1)?));
        tables.push((format!("{}_snv.csv", names[2]), snv_frame(&self.filtered.replicate_2)?));
        for rep in 0..2 {
            let control = &names[rep + 1];
            tables.push((
                format!("{}_normalized.csv", control),
                normalized_frame(&self.normalized[rep])?,
            ));
        }
        tables.push(("scored_snv.csv".to_string(), scored_frame(&self.snv_scores)?));
        tables.push(("scored_aa.csv".to_string(), scored_frame(&self.aa_scores)?));

        fs::create_dir_all(out_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".screen_run")
            .tempdir_in(out_dir)?;

        let mut files = Vec::with_capacity(tables.len() + 1);
        for (file, mut df) in tables {
            dataframe_to_csv(&mut df, &staging.path().join(&file))?;
            files.push(file);
        }
        write_json(&self.summary, &staging.path().join(SUMMARY_FILE))?;
        files.push(SUMMARY_FILE.to_string());

        if let Some(blocked) = files.iter().map(|f| out_dir.join(f)).find(|p| p.is_dir()) {
            return Err(ScreenError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", blocked.display()),
            )));
        }

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let path = out_dir.join(&file);
            fs::rename(staging.path().join(&file), &path)?;
            written.push(path);
        }

        info!("Wrote {} files to {}", written.len(), out_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SYN_SITES: usize = 8;

    fn seq(i: usize) -> String {
        format!("SEQ{:03}", i)
    }

    /// Eight synonymous SNVs plus one missense SNV that expands under drug.
    fn write_catalog(dir: &Path) -> PathBuf {
        let mut body = String::from("RefSeq,Label,AA_var,SNV_var\nWTSEQ,WT_refseq,,\n");
        for i in 0..SYN_SITES {
            body.push_str(&format!("{},SynPE,K{}K,pos{}AG\n", seq(i), i + 1, (i + 1) * 10));
        }
        body.push_str(&format!("{},SynPE,T99A,pos45CT\n", seq(SYN_SITES)));
        let path = dir.join("catalog.csv");
        fs::write(&path, body).unwrap();
        path
    }

    fn write_freq(dir: &Path, name: &str, wt: u64, per_variant: &dyn Fn(usize) -> u64) -> PathBuf {
        let mut body = String::from("Aligned_Sequence\tReference_Sequence\t#Reads\t%Reads\n");
        body.push_str(&format!("WTSEQ\tWTSEQ\t{}\t0.0\n", wt));
        for i in 0..=SYN_SITES {
            body.push_str(&format!("{}\t{}\t{}\t0.0\n", seq(i), seq(i), per_variant(i)));
        }
        body.push_str("JUNK\tJUNK\t7\t0.0\n");
        let path = dir.join(format!("{}.txt", name));
        fs::write(&path, body).unwrap();
        path
    }

    fn inputs(dir: &Path) -> ScreenInputs {
        let catalog = write_catalog(dir);
        let unedited = write_freq(dir, "unedited", 10_000, &|_| 1);
        let control_1 = write_freq(dir, "control_1", 1_000, &|i| 200 + 3 * i as u64);
        let control_2 = write_freq(dir, "control_2", 1_000, &|i| 220 + 2 * i as u64);
        let test = |i: usize| if i == SYN_SITES { 2_000 } else { 150 + (i as u64 % 3) * 10 };
        let test_1 = write_freq(dir, "test_1", 1_000, &test);
        let test_2 = write_freq(dir, "test_2", 1_000, &test);
        ScreenInputs {
            catalog,
            unedited,
            control: [control_1, control_2],
            test: [test_1, test_2],
        }
    }

    #[test]
    fn full_run_scores_and_writes_every_table() {
        let dir = tempdir().unwrap();
        let inputs = inputs(dir.path());
        let run = run_screen(&inputs, &ScreenConfig::default()).unwrap();

        assert_eq!(run.counts.len(), 5);
        assert!(run.counts.iter().all(|c| c.unmatched == 7));
        assert_eq!(run.filtered.kept.len(), SYN_SITES + 1);
        assert_eq!(run.snv_scores.rows.len(), SYN_SITES + 1);

        let missense = run
            .snv_scores
            .rows
            .iter()
            .find(|r| r.key == "pos45CT")
            .unwrap();
        assert_eq!(missense.classification.to_string(), "Resistant");

        let out = dir.path().join("out");
        let written = run.write(&out).unwrap();
        assert!(out.join(SUMMARY_FILE).exists());
        assert!(out.join("scored_aa.csv").exists());
        assert!(out.join("control_1_normalized.csv").exists());
        assert_eq!(written.len(), 14);

        let leftovers: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(".screen_run"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn blocked_output_leaves_no_partial_set() {
        let dir = tempdir().unwrap();
        let inputs = inputs(dir.path());
        let run = run_screen(&inputs, &ScreenConfig::default()).unwrap();

        let out = dir.path().join("out");
        fs::create_dir_all(out.join("scored_aa.csv")).unwrap();
        let result = run.write(&out);
        assert!(matches!(result, Err(ScreenError::Io(_))));

        let entries: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["scored_aa.csv".to_string()]);
    }

    #[test]
    fn failing_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let inputs = inputs(dir.path());
        let config = ScreenConfig {
            min_synonymous: 50,
            ..ScreenConfig::default()
        };
        let out = dir.path().join("out");
        let result = run_screen(&inputs, &config).and_then(|run| run.write(&out));
        assert!(matches!(result, Err(ScreenError::DataInsufficient(_))));
        assert!(!out.exists());
    }
}

use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ScreenConfig;
use crate::data_handling::normalized_table::NormalizedTableFile;
use crate::data_handling::AA_VAR_COL;
use crate::errors::{ScreenError, ScreenResult};
use crate::helper_functions::{mean, quantile};
use crate::models::{
    Classification, Dataset, MutType, NormalizedVariant, ScoreLevel, ScoredVariant,
};

pub const N_LFC_1_COL: &str = "nLFC_1";
pub const N_LFC_2_COL: &str = "nLFC_2";
pub const ADJUSTED_LFC_COL: &str = "Adjusted_LFC";
pub const MUT_TYPE_COL: &str = "mut_type";
pub const CLASS_COL: &str = "Class";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileCutoffs {
    pub sensitive: f64,
    pub resistant: f64,
}

impl From<&ScreenConfig> for QuantileCutoffs {
    fn from(config: &ScreenConfig) -> Self {
        QuantileCutoffs {
            sensitive: config.sensitive_cutoff,
            resistant: config.resistant_cutoff,
        }
    }
}

/// Per-replicate nLFC thresholds drawn from the synonymous distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreThresholds {
    pub resistant_1: f64,
    pub resistant_2: f64,
    pub sensitive_1: f64,
    pub sensitive_2: f64,
}

impl ScoreThresholds {
    pub fn classify(&self, n_lfc_1: f64, n_lfc_2: f64) -> Classification {
        if n_lfc_1 > self.resistant_1 && n_lfc_2 > self.resistant_2 {
            Classification::Resistant
        } else if n_lfc_1 < self.sensitive_1 && n_lfc_2 < self.sensitive_2 {
            Classification::Sensitive
        } else {
            Classification::Intermediate
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub level: ScoreLevel,
    pub rows: Vec<ScoredVariant>,
    pub thresholds: ScoreThresholds,
}

impl ScoreResult {
    pub fn class_counts(&self) -> [(Classification, usize); 3] {
        let count = |c: Classification| self.rows.iter().filter(|r| r.classification == c).count();
        [
            (Classification::Resistant, count(Classification::Resistant)),
            (Classification::Intermediate, count(Classification::Intermediate)),
            (Classification::Sensitive, count(Classification::Sensitive)),
        ]
    }
}

/// One replicate's score for a join key.
#[derive(Debug, Clone)]
struct KeyedScore {
    key: String,
    aa_var: String,
    mut_type: MutType,
    n_lfc: f64,
}

/// Rows keyed for the join, in first-seen order. At amino-acid level the
/// normalized LFC of every contributing SNV is averaged.
fn keyed_scores(rows: &[NormalizedVariant], level: ScoreLevel) -> Vec<KeyedScore> {
    match level {
        ScoreLevel::Snv => rows
            .iter()
            .map(|r| KeyedScore {
                key: r.snv_var.clone(),
                aa_var: r.aa_var.clone(),
                mut_type: r.mut_type,
                n_lfc: r.normalized_lfc,
            })
            .collect(),
        ScoreLevel::AminoAcid => {
            let mut order: Vec<(KeyedScore, Vec<f64>)> = Vec::new();
            let mut index: HashMap<&str, usize> = HashMap::new();
            for r in rows {
                match index.get(r.aa_var.as_str()) {
                    Some(&i) => order[i].1.push(r.normalized_lfc),
                    None => {
                        index.insert(r.aa_var.as_str(), order.len());
                        order.push((
                            KeyedScore {
                                key: r.aa_var.clone(),
                                aa_var: r.aa_var.clone(),
                                mut_type: r.mut_type,
                                n_lfc: f64::NAN,
                            },
                            vec![r.normalized_lfc],
                        ));
                    }
                }
            }
            order
                .into_iter()
                .map(|(mut score, values)| {
                    score.n_lfc = mean(&values);
                    score
                })
                .collect()
        }
    }
}

fn synonymous_quantile(values: &[f64], q: f64, replicate: usize) -> ScreenResult<f64> {
    quantile(values, q).ok_or_else(|| {
        ScreenError::DataInsufficient(format!(
            "replicate {} has no synonymous variants to derive the {} quantile from",
            replicate, q
        ))
    })
}

/// Joins two normalized replicates on the level's key, averages them and
/// classifies every shared variant against synonymous-derived thresholds.
pub fn score_variants(
    rep_1: &[NormalizedVariant],
    rep_2: &[NormalizedVariant],
    level: ScoreLevel,
    cutoffs: &QuantileCutoffs,
) -> ScreenResult<ScoreResult> {
    if cutoffs.resistant <= cutoffs.sensitive {
        return Err(ScreenError::InvalidParameter(format!(
            "resistant quantile {} must exceed sensitive quantile {}",
            cutoffs.resistant, cutoffs.sensitive
        )));
    }

    let keyed_1 = keyed_scores(rep_1, level);
    let keyed_2: HashMap<String, KeyedScore> = keyed_scores(rep_2, level)
        .into_iter()
        .map(|k| (k.key.clone(), k))
        .collect();
    let keys_1 = keyed_1.len();

    let joined: Vec<(KeyedScore, f64)> = keyed_1
        .into_iter()
        .filter_map(|k| keyed_2.get(&k.key).map(|other| (k, other.n_lfc)))
        .collect();
    let one_sided =
        keys_1.saturating_sub(joined.len()) + keyed_2.len().saturating_sub(joined.len());
    if one_sided > 0 {
        warn!("{} keys present in one replicate only were dropped", one_sided);
    }
    debug!("Joined {} keys on {}", joined.len(), level.key_column());

    let (syn_1, syn_2): (Vec<f64>, Vec<f64>) = joined
        .iter()
        .filter(|(k, _)| k.mut_type == MutType::Synonymous)
        .map(|(k, n2)| (k.n_lfc, *n2))
        .unzip();
    let thresholds = ScoreThresholds {
        resistant_1: synonymous_quantile(&syn_1, cutoffs.resistant, 1)?,
        resistant_2: synonymous_quantile(&syn_2, cutoffs.resistant, 2)?,
        sensitive_1: synonymous_quantile(&syn_1, cutoffs.sensitive, 1)?,
        sensitive_2: synonymous_quantile(&syn_2, cutoffs.sensitive, 2)?,
    };
    info!(
        "Thresholds: resistant {:.3}/{:.3}, sensitive {:.3}/{:.3}",
        thresholds.resistant_1, thresholds.resistant_2, thresholds.sensitive_1, thresholds.sensitive_2
    );

    let rows: Vec<ScoredVariant> = joined
        .into_iter()
        .map(|(k, n_lfc_2)| ScoredVariant {
            classification: thresholds.classify(k.n_lfc, n_lfc_2),
            adjusted_lfc: (k.n_lfc + n_lfc_2) / 2.0,
            n_lfc_1: k.n_lfc,
            n_lfc_2,
            key: k.key,
            aa_var: k.aa_var,
            mut_type: k.mut_type,
        })
        .collect();

    let result = ScoreResult {
        level,
        rows,
        thresholds,
    };
    for (class, n) in result.class_counts() {
        info!("{}: {}", class, n);
    }
    Ok(result)
}

/// Output table; the key column is `SNV_var` or `AA_var` depending on level.
pub fn scored_frame(result: &ScoreResult) -> PolarsResult<DataFrame> {
    let rows = &result.rows;
    let mut columns = vec![Column::new(
        result.level.key_column().into(),
        rows.iter().map(|r| r.key.clone()).collect::<Vec<_>>(),
    )];
    if result.level == ScoreLevel::Snv {
        columns.push(Column::new(
            AA_VAR_COL.into(),
            rows.iter().map(|r| r.aa_var.clone()).collect::<Vec<_>>(),
        ));
    }
    columns.extend([
        Column::new(
            N_LFC_1_COL.into(),
            rows.iter().map(|r| r.n_lfc_1).collect::<Vec<_>>(),
        ),
        Column::new(
            N_LFC_2_COL.into(),
            rows.iter().map(|r| r.n_lfc_2).collect::<Vec<_>>(),
        ),
        Column::new(
            ADJUSTED_LFC_COL.into(),
            rows.iter().map(|r| r.adjusted_lfc).collect::<Vec<_>>(),
        ),
        Column::new(
            MUT_TYPE_COL.into(),
            rows.iter().map(|r| r.mut_type.to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            CLASS_COL.into(),
            rows.iter()
                .map(|r| r.classification.to_string())
                .collect::<Vec<_>>(),
        ),
    ]);
    DataFrame::new(columns)
}

/// File-level entry point of the `score` stage.
pub fn run_scoring(
    rep_1: &Path,
    rep_2: &Path,
    level: ScoreLevel,
    cutoffs: &QuantileCutoffs,
) -> ScreenResult<ScoreResult> {
    let rows_1 = NormalizedTableFile { path: rep_1.to_path_buf() }.read()?;
    let rows_2 = NormalizedTableFile { path: rep_2.to_path_buf() }.read()?;
    info!(
        "Scoring {} / {} normalized rows at {} level",
        rows_1.len(),
        rows_2.len(),
        level.key_column()
    );
    score_variants(&rows_1, &rows_2, level, cutoffs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nv(snv: &str, aa: &str, n_lfc: f64) -> NormalizedVariant {
        NormalizedVariant {
            snv_var: snv.to_string(),
            aa_var: aa.to_string(),
            control: 1.0,
            test: 1.0,
            raw_lfc: 0.0,
            var_pos: 1,
            mut_type: MutType::from_aa_var(aa).unwrap(),
            lws_reg: 0.0,
            normalized_lfc: n_lfc,
        }
    }

    fn synonymous_background() -> Vec<NormalizedVariant> {
        (0..=10)
            .map(|i| nv(&format!("pos{}AG", i), "K1K", i as f64 / 10.0))
            .collect()
    }

    fn cutoffs() -> QuantileCutoffs {
        QuantileCutoffs {
            sensitive: 0.5,
            resistant: 0.9,
        }
    }

    #[test]
    fn both_replicates_must_agree() {
        let t = ScoreThresholds {
            resistant_1: 1.0,
            resistant_2: 1.0,
            sensitive_1: 0.0,
            sensitive_2: 0.0,
        };
        assert_eq!(t.classify(2.0, 2.0), Classification::Resistant);
        assert_eq!(t.classify(2.0, 0.5), Classification::Intermediate);
        assert_eq!(t.classify(-1.0, -1.0), Classification::Sensitive);
        assert_eq!(t.classify(-1.0, 2.0), Classification::Intermediate);
        assert_eq!(t.classify(1.0, 1.0), Classification::Intermediate);
    }

    #[test]
    fn snv_level_joins_averages_and_classifies() {
        let mut rep_1 = synonymous_background();
        let mut rep_2 = synonymous_background();
        rep_1.push(nv("pos50CT", "T5A", 3.0));
        rep_2.push(nv("pos50CT", "T5A", 5.0));
        rep_1.push(nv("pos60CT", "L6F", -2.0));
        rep_2.push(nv("pos60CT", "L6F", -4.0));
        rep_1.push(nv("pos70CT", "G7Stop", 1.0));

        let result = score_variants(&rep_1, &rep_2, ScoreLevel::Snv, &cutoffs()).unwrap();
        assert_eq!(result.rows.len(), 13);
        assert!((result.thresholds.resistant_1 - 0.9).abs() < 1e-12);
        assert!((result.thresholds.sensitive_2 - 0.5).abs() < 1e-12);

        let strong = result.rows.iter().find(|r| r.key == "pos50CT").unwrap();
        assert_eq!(strong.adjusted_lfc, 4.0);
        assert_eq!(strong.classification, Classification::Resistant);
        let weak = result.rows.iter().find(|r| r.key == "pos60CT").unwrap();
        assert_eq!(weak.classification, Classification::Sensitive);
        assert!(result.rows.iter().all(|r| r.key != "pos70CT"));
    }

    #[test]
    fn amino_acid_level_averages_contributing_snvs() {
        let mut rep_1 = synonymous_background();
        let mut rep_2 = synonymous_background();
        rep_1.push(nv("pos50CT", "T5A", 2.0));
        rep_1.push(nv("pos51CG", "T5A", 4.0));
        rep_2.push(nv("pos50CT", "T5A", 6.0));

        let result = score_variants(&rep_1, &rep_2, ScoreLevel::AminoAcid, &cutoffs()).unwrap();
        assert_eq!(result.rows.len(), 2);
        let t5a = result.rows.iter().find(|r| r.key == "T5A").unwrap();
        assert_eq!(t5a.n_lfc_1, 3.0);
        assert_eq!(t5a.n_lfc_2, 6.0);
        assert_eq!(t5a.adjusted_lfc, 4.5);
    }

    #[test]
    fn classes_partition_every_row() {
        let rep_1: Vec<_> = (0..50)
            .map(|i| nv(&format!("pos{}AG", i), if i % 3 == 0 { "K1K" } else { "K1R" }, (i % 7) as f64 - 3.0))
            .collect();
        let rep_2: Vec<_> = (0..50)
            .map(|i| nv(&format!("pos{}AG", i), if i % 3 == 0 { "K1K" } else { "K1R" }, (i % 5) as f64 - 2.0))
            .collect();
        let result = score_variants(&rep_1, &rep_2, ScoreLevel::Snv, &cutoffs()).unwrap();
        let total: usize = result.class_counts().iter().map(|(_, n)| n).sum();
        assert_eq!(total, result.rows.len());
    }

    #[test]
    fn no_synonymous_rows_is_data_insufficient() {
        let rep = vec![nv("pos1AG", "K1R", 1.0)];
        assert!(matches!(
            score_variants(&rep, &rep, ScoreLevel::Snv, &cutoffs()),
            Err(ScreenError::DataInsufficient(_))
        ));
    }

    #[test]
    fn inverted_quantiles_are_rejected() {
        let rep = synonymous_background();
        let bad = QuantileCutoffs {
            sensitive: 0.9,
            resistant: 0.5,
        };
        assert!(matches!(
            score_variants(&rep, &rep, ScoreLevel::Snv, &bad),
            Err(ScreenError::InvalidParameter(_))
        ));
    }

    #[test]
    fn frame_uses_level_key_column() {
        let rep = synonymous_background();
        let result = score_variants(&rep, &rep, ScoreLevel::AminoAcid, &cutoffs()).unwrap();
        let df = scored_frame(&result).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["AA_var", "nLFC_1", "nLFC_2", "Adjusted_LFC", "mut_type", "Class"]);
    }
}

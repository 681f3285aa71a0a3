use std::path::Path;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ScreenConfig;
use crate::data_handling::snv_table::SnvTableFile;
use crate::errors::{ScreenError, ScreenResult};
use crate::helper_functions::{sample_name, sample_std};
use crate::smoothing::Lowess;
use crate::models::{Dataset, MutType, NormalizedVariant, SnvAggregate};

/// Position digits sit between the first `pos` token and the two trailing
/// nucleotide characters, e.g. `pos1234AG`.
const POSITION_PATTERN: &str = r"^.*?pos(.+)..$";

/// Pseudocount-stabilised log2 fold change of test over control.
pub fn raw_lfc(control: f64, test: f64) -> f64 {
    ((test + 1.0) / (control + 1.0)).log2()
}

pub fn position_regex() -> ScreenResult<Regex> {
    Regex::new(POSITION_PATTERN)
        .map_err(|e| ScreenError::InvalidParameter(format!("bad position pattern: {}", e)))
}

pub fn variant_position(pattern: &Regex, snv_var: &str) -> ScreenResult<i64> {
    pattern
        .captures(snv_var)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| {
            ScreenError::MalformedInput(format!("cannot read a position from SNV `{}`", snv_var))
        })
}

pub struct LfcNormalizer {
    lowess: Lowess,
    min_synonymous: usize,
}

impl LfcNormalizer {
    pub fn new(lowess: Lowess, min_synonymous: usize) -> Self {
        LfcNormalizer {
            lowess,
            min_synonymous,
        }
    }

    pub fn from_config(config: &ScreenConfig) -> ScreenResult<Self> {
        let lowess = Lowess::new(config.lowess_frac, config.lowess_iterations)?;
        Ok(Self::new(lowess, config.min_synonymous))
    }

    /// Position-corrected, synonymous-standardised fold changes of one replicate.
    pub fn normalize(&self, rows: &[SnvAggregate]) -> ScreenResult<Vec<NormalizedVariant>> {
        let pattern = position_regex()?;

        let mut variants = Vec::with_capacity(rows.len());
        for row in rows {
            variants.push(NormalizedVariant {
                snv_var: row.snv_var.clone(),
                aa_var: row.aa_var.clone(),
                control: row.control,
                test: row.test,
                raw_lfc: raw_lfc(row.control, row.test),
                var_pos: variant_position(&pattern, &row.snv_var)?,
                mut_type: MutType::from_aa_var(&row.aa_var)?,
                lws_reg: f64::NAN,
                normalized_lfc: f64::NAN,
            });
        }

        let (syn_pos, syn_lfc): (Vec<f64>, Vec<f64>) = variants
            .iter()
            .filter(|v| v.mut_type == MutType::Synonymous)
            .map(|v| (v.var_pos as f64, v.raw_lfc))
            .unzip();
        let needed = self.min_synonymous.max(2);
        if syn_lfc.len() < needed {
            return Err(ScreenError::DataInsufficient(format!(
                "{} synonymous variants, at least {} are needed to fit the position trend",
                syn_lfc.len(),
                needed
            )));
        }
        debug!(
            "Fitting position trend on {} of {} variants",
            syn_lfc.len(),
            variants.len()
        );

        let trend = self.lowess.fit(&syn_pos, &syn_lfc)?;
        let spread = sample_std(&syn_lfc).unwrap_or(0.0);
        let degenerate = !spread.is_finite() || spread.abs() < 1e-12;
        if degenerate {
            warn!("Synonymous fold changes have no spread; normalized LFC set to 0");
        }

        for v in &mut variants {
            v.lws_reg = trend.predict(v.var_pos as f64);
            v.normalized_lfc = if degenerate {
                0.0
            } else {
                (v.raw_lfc - v.lws_reg) / spread
            };
        }
        Ok(variants)
    }
}

/// File-level entry point of the `normalize` stage.
pub fn run_normalization(snv_table: &Path, config: &ScreenConfig) -> ScreenResult<Vec<NormalizedVariant>> {
    let name = sample_name(snv_table);
    let rows = SnvTableFile {
        path: snv_table.to_path_buf(),
    }
    .read()?;
    info!("[{}] Normalizing {} SNVs", name, rows.len());
    LfcNormalizer::from_config(config)?.normalize(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snv(pos: i64, aa: &str, control: f64, test: f64) -> SnvAggregate {
        SnvAggregate {
            snv_var: format!("pos{}AG", pos),
            aa_var: aa.to_string(),
            control,
            test,
        }
    }

    fn normalizer(frac: f64) -> LfcNormalizer {
        LfcNormalizer::new(Lowess::new(frac, 3).unwrap(), 4)
    }

    #[test]
    fn raw_lfc_uses_pseudocounts() {
        assert_eq!(raw_lfc(0.0, 0.0), 0.0);
        assert!((raw_lfc(3.0, 7.0) - 1.0).abs() < 1e-12);
        assert!((raw_lfc(15.0, 0.0) + 4.0).abs() < 1e-12);
    }

    #[test]
    fn position_is_read_between_token_and_nucleotides() {
        let re = position_regex().unwrap();
        assert_eq!(variant_position(&re, "pos1234AG").unwrap(), 1234);
        assert_eq!(variant_position(&re, "ABL1_pos87CT").unwrap(), 87);
        assert!(matches!(
            variant_position(&re, "pos12"),
            Err(ScreenError::MalformedInput(_))
        ));
        assert!(matches!(
            variant_position(&re, "1234AG"),
            Err(ScreenError::MalformedInput(_))
        ));
    }

    #[test]
    fn flat_synonymous_trend_guards_zero_spread() {
        let rows = vec![
            snv(10, "K1K", 3.0, 7.0),
            snv(20, "L2L", 3.0, 7.0),
            snv(30, "G3G", 3.0, 7.0),
            snv(40, "T4T", 3.0, 7.0),
            snv(25, "T4A", 0.0, 15.0),
        ];
        let out = normalizer(0.15).normalize(&rows).unwrap();
        for v in &out {
            assert!((v.lws_reg - 1.0).abs() < 1e-9);
            assert_eq!(v.normalized_lfc, 0.0);
        }
        assert_eq!(out[4].mut_type, MutType::Missense);
        assert!((out[4].raw_lfc - 4.0).abs() < 1e-12);
    }

    #[test]
    fn residuals_are_scaled_by_synonymous_spread() {
        // synonymous raw LFC = pos / 10, an exact line
        let mut rows: Vec<SnvAggregate> = (1..=5)
            .map(|k| snv(k * 10, "S5S", 0.0, 2f64.powi(k as i32) - 1.0))
            .collect();
        rows.push(snv(25, "E7Stop", 0.0, 15.0));

        let out = normalizer(1.0).normalize(&rows).unwrap();
        let nonsense = &out[5];
        assert_eq!(nonsense.mut_type, MutType::Nonsense);
        assert_eq!(nonsense.var_pos, 25);
        assert!((nonsense.lws_reg - 2.5).abs() < 1e-6);
        assert!((nonsense.normalized_lfc - 0.9486833).abs() < 1e-6);
        for v in &out[..5] {
            assert!(v.normalized_lfc.abs() < 1e-6);
        }
    }

    #[test]
    fn too_few_synonymous_variants_is_data_insufficient() {
        let rows = vec![
            snv(10, "K1K", 3.0, 7.0),
            snv(20, "L2L", 3.0, 7.0),
            snv(30, "G3G", 3.0, 7.0),
            snv(40, "T4A", 3.0, 7.0),
        ];
        assert!(matches!(
            normalizer(0.15).normalize(&rows),
            Err(ScreenError::DataInsufficient(_))
        ));
    }
}

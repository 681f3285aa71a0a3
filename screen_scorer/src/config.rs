use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{ScreenError, ScreenResult};

/// Tunable cutoffs for one scoring run. Every field has a default, so a
/// config file only needs to name the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    #[serde(rename = "OR_cutoff")]
    pub or_cutoff: f64,
    pub p_cutoff: f64,
    pub rpm_cutoff: f64,
    pub lowess_frac: f64,
    pub lowess_iterations: usize,
    /// Fewest synonymous variants the position trend may be fitted on.
    pub min_synonymous: usize,
    pub sensitive_cutoff: f64,
    pub resistant_cutoff: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            or_cutoff: 2.0,
            p_cutoff: 0.05,
            rpm_cutoff: 10.0,
            lowess_frac: 0.15,
            lowess_iterations: 3,
            min_synonymous: 4,
            sensitive_cutoff: 0.95,
            resistant_cutoff: 0.997,
        }
    }
}

impl ScreenConfig {
    pub fn from_json(path: &Path) -> ScreenResult<Self> {
        info!("Reading configuration from {}", path.display());
        let raw = fs::read_to_string(path)?;
        let config: ScreenConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the file's values when a path is given.
    pub fn load(path: Option<&Path>) -> ScreenResult<Self> {
        match path {
            Some(p) => Self::from_json(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> ScreenResult<()> {
        let unit = |name: &str, v: f64| -> ScreenResult<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ScreenError::InvalidParameter(format!(
                    "{} must lie in [0, 1], got {}",
                    name, v
                )))
            }
        };
        unit("p_cutoff", self.p_cutoff)?;
        unit("sensitive_cutoff", self.sensitive_cutoff)?;
        unit("resistant_cutoff", self.resistant_cutoff)?;

        if !(self.lowess_frac > 0.0 && self.lowess_frac <= 1.0) {
            return Err(ScreenError::InvalidParameter(format!(
                "lowess_frac must lie in (0, 1], got {}",
                self.lowess_frac
            )));
        }
        if self.resistant_cutoff <= self.sensitive_cutoff {
            return Err(ScreenError::InvalidParameter(format!(
                "resistant_cutoff ({}) must exceed sensitive_cutoff ({})",
                self.resistant_cutoff, self.sensitive_cutoff
            )));
        }
        if self.or_cutoff < 0.0 || self.rpm_cutoff < 0.0 {
            return Err(ScreenError::InvalidParameter(
                "OR_cutoff and rpm_cutoff must be non-negative".to_string(),
            ));
        }
        if self.min_synonymous < 2 {
            return Err(ScreenError::InvalidParameter(format!(
                "min_synonymous must be at least 2, got {}",
                self.min_synonymous
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"OR_cutoff": 3.0, "lowess_frac": 0.3}}"#).unwrap();
        let config = ScreenConfig::from_json(file.path()).unwrap();
        assert_eq!(config.or_cutoff, 3.0);
        assert_eq!(config.lowess_frac, 0.3);
        assert_eq!(config.p_cutoff, 0.05);
        assert_eq!(config.resistant_cutoff, 0.997);
    }

    #[test]
    fn inverted_quantiles_are_rejected() {
        let config = ScreenConfig {
            sensitive_cutoff: 0.99,
            resistant_cutoff: 0.95,
            ..ScreenConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScreenError::InvalidParameter(_))
        ));
    }

    #[test]
    fn defaults_are_valid() {
        ScreenConfig::default().validate().unwrap();
    }
}

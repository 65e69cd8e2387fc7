//! Generator and load-time configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SynthError, SynthResult};

/// Construction options for a [`MarkovGenerator`](crate::models::MarkovGenerator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// RNG seed. `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Absolute tolerance on each row sum of the transition matrix.
    #[serde(default = "default_tolerance")]
    pub row_sum_tolerance: f64,
    #[serde(default = "default_log_target")]
    pub log_target: String,
    #[serde(default = "default_true")]
    pub logging: bool,
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_log_target() -> String {
    "synd::markov".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            row_sum_tolerance: default_tolerance(),
            log_target: default_log_target(),
            logging: true,
        }
    }
}

impl GeneratorConfig {
    /// Default configuration with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Override the row-sum tolerance when one is given.
    pub fn with_row_sum_tolerance(mut self, tolerance: Option<f64>) -> Self {
        if let Some(tolerance) = tolerance {
            self.row_sum_tolerance = tolerance;
        }
        self
    }

    pub fn from_json_str(text: &str) -> SynthResult<Self> {
        let cfg: GeneratorConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SynthResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            SynthError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> SynthResult<()> {
        let tol = self.row_sum_tolerance;
        if !tol.is_finite() || tol <= 0.0 || tol >= 1.0 {
            return Err(SynthError::Config(format!(
                "row_sum_tolerance must be in (0, 1), got {tol}"
            )));
        }
        if self.log_target.trim().is_empty() {
            return Err(SynthError::Config("log_target must not be empty".into()));
        }
        Ok(())
    }
}

/// What to do with the stored random stream when a model is loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reseed {
    /// Continue exactly where the saved model left off.
    #[default]
    Preserve,
    /// Restart the stream from a fixed seed (reproducible replay).
    Seed(u64),
    /// Take fresh randomness from the OS.
    Entropy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub reseed: Reseed,
}

impl LoadOptions {
    pub fn reseeded(seed: u64) -> Self {
        Self {
            reseed: Reseed::Seed(seed),
        }
    }

    pub fn fresh() -> Self {
        Self {
            reseed: Reseed::Entropy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_defaults() {
        let cfg = GeneratorConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, GeneratorConfig::default());
        assert_eq!(cfg.seed, None);
        assert!((cfg.row_sum_tolerance - 1e-8).abs() < 1e-20);
        assert!(cfg.logging);
    }

    #[test]
    fn test_json_overrides() {
        let cfg = GeneratorConfig::from_json_str(
            r#"{"seed": 7, "row_sum_tolerance": 1e-6, "logging": false}"#,
        )
        .unwrap();
        assert_eq!(cfg.seed, Some(7));
        assert!(!cfg.logging);
        assert_eq!(cfg.log_target, "synd::markov");
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        for text in [
            r#"{"row_sum_tolerance": 0.0}"#,
            r#"{"row_sum_tolerance": -1e-6}"#,
            r#"{"row_sum_tolerance": 1.5}"#,
        ] {
            let err = GeneratorConfig::from_json_str(text).unwrap_err();
            assert!(matches!(err, SynthError::Config(_)), "{text}");
        }
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = GeneratorConfig::from_json_str("{seed: 1").unwrap_err();
        assert!(matches!(err, SynthError::Json(_)));
    }

    #[test]
    fn test_tolerance_override() {
        let cfg = GeneratorConfig::seeded(1).with_row_sum_tolerance(None);
        assert_eq!(cfg, GeneratorConfig::seeded(1));

        let cfg = GeneratorConfig::seeded(1).with_row_sum_tolerance(Some(1e-5));
        assert_eq!(cfg.row_sum_tolerance, 1e-5);
        assert!(cfg.validate().is_ok());

        let cfg = GeneratorConfig::default().with_row_sum_tolerance(Some(f64::NAN));
        assert!(matches!(cfg.validate(), Err(SynthError::Config(_))));
    }

    #[test]
    fn test_reseed_serde() {
        let opts: LoadOptions = serde_json::from_str(r#"{"reseed": {"seed": 3}}"#).unwrap();
        assert_eq!(opts, LoadOptions::reseeded(3));
        let opts: LoadOptions = serde_json::from_str(r#"{"reseed": "entropy"}"#).unwrap();
        assert_eq!(opts, LoadOptions::fresh());
        let opts: LoadOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.reseed, Reseed::Preserve);
    }
}

//! Configuration for the showtape application.
//!
//! Resolution order, later wins:
//! 1. Hardware defaults
//! 2. `--config <FILE>` (TOML; missing keys keep their defaults)
//! 3. Command-line overrides
//!
//! `--print-config` prints the resolved values so a run can be reproduced.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use showtape_core::conformance::{ConformanceSimulator, Thresholds};
use showtape_core::decoder::{DecoderConfig, LineDecoder};
use showtape_core::impairment::ImpairmentConfig;
use showtape_core::sync::DEFAULT_SEARCH_WINDOW;

/// Complete configuration for a codec run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub decoder: DecoderConfig,
    pub sync: SyncConfig,
    pub thresholds: Thresholds,
    /// Line impairment used by `demo`
    pub impairment: ImpairmentConfig,
}

/// Frame synchronizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bit offsets tried when searching for frame lock
    pub search_window: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            search_window: DEFAULT_SEARCH_WINDOW,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            sync: SyncConfig::default(),
            thresholds: Thresholds::default(),
            impairment: ImpairmentConfig::perfect(0),
        }
    }
}

/// Command-line overrides shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Decoder window half-width as a fraction (0.3 = ±30%)
    #[arg(long, global = true, value_name = "FRACTION")]
    pub tolerance: Option<f64>,

    /// Samples below this magnitude are treated as gaps
    #[arg(long, global = true, value_name = "LEVEL")]
    pub zero_threshold: Option<u16>,

    /// Reject a HALF run followed by a non-HALF run even when they sum to FULL
    #[arg(long, global = true)]
    pub strict_pairs: bool,

    /// Bit offsets searched for frame lock
    #[arg(long, global = true, value_name = "BITS")]
    pub search_window: Option<usize>,

    /// Highest accepted decode error rate (0.02 = 2%)
    #[arg(long, global = true, value_name = "FRACTION")]
    pub max_error_rate: Option<f64>,

    /// Lowest accepted fraction of frames with clean blanks
    #[arg(long, global = true, value_name = "FRACTION")]
    pub min_blank_ok_rate: Option<f64>,

    /// Lowest accepted lock score
    #[arg(long, global = true, value_name = "FRAMES")]
    pub min_lock_score: Option<usize>,
}

impl CodecConfig {
    /// Load from an optional TOML file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn apply(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(tolerance) = overrides.tolerance {
            self.decoder.tolerance = tolerance;
        }
        if let Some(zero_threshold) = overrides.zero_threshold {
            self.decoder.zero_threshold = zero_threshold;
        }
        if overrides.strict_pairs {
            self.decoder.accept_marginal_pairs = false;
        }
        if let Some(search_window) = overrides.search_window {
            self.sync.search_window = search_window;
        }
        if let Some(rate) = overrides.max_error_rate {
            self.thresholds.max_error_rate = rate;
        }
        if let Some(rate) = overrides.min_blank_ok_rate {
            self.thresholds.min_blank_ok_rate = rate;
        }
        if let Some(score) = overrides.min_lock_score {
            self.thresholds.min_lock_score = score;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| -> Result<()> {
            anyhow::ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be between 0 and 1, got {value}"
            );
            Ok(())
        };

        anyhow::ensure!(
            self.decoder.tolerance.is_finite() && self.decoder.tolerance >= 0.0,
            "decoder.tolerance must be a non-negative number, got {}",
            self.decoder.tolerance
        );
        anyhow::ensure!(self.decoder.sample_rate > 0, "decoder.sample_rate must be positive");
        anyhow::ensure!(self.decoder.baud_rate > 0, "decoder.baud_rate must be positive");
        self.thresholds.validate().context("thresholds")?;
        unit("impairment.dropout_rate", self.impairment.dropout_rate)?;
        Ok(())
    }

    pub fn simulator(&self) -> ConformanceSimulator {
        ConformanceSimulator::new(self.decoder, self.thresholds)
            .with_search_window(self.sync.search_window)
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        println!("=== Configuration ===");
        println!("Sample rate: {} Hz", self.decoder.sample_rate);
        println!("Baud rate: {}", self.decoder.baud_rate);
        println!();
        println!("=== Decoder ===");
        println!("{}", LineDecoder::new(self.decoder).tolerance_summary());
        println!("Zero threshold: {}", self.decoder.zero_threshold);
        println!("Marginal pairs: {}", if self.decoder.accept_marginal_pairs { "accepted" } else { "rejected" });
        println!();
        println!("=== Sync ===");
        println!("Search window: {} bits", self.sync.search_window);
        println!();
        println!("=== Thresholds ===");
        println!("Max error rate: {:.2}%", self.thresholds.max_error_rate * 100.0);
        println!("Min blank-ok rate: {:.2}%", self.thresholds.min_blank_ok_rate * 100.0);
        println!("Min lock score: {}", self.thresholds.min_lock_score);
        println!();
        println!("=== Line Impairment (demo) ===");
        println!("Seed: {}", self.impairment.seed);
        println!("Jitter: ±{} samples", self.impairment.jitter_samples);
        println!("Dropout rate: {:.2}%", self.impairment.dropout_rate * 100.0);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = CodecConfig::load(None).unwrap();
        assert_eq!(config, CodecConfig::default());
        assert_eq!(config.decoder.tolerance, 0.30);
        assert_eq!(config.sync.search_window, 500);
        assert_eq!(config.thresholds.min_lock_score, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[decoder]\ntolerance = 0.1\n\n[thresholds]\nmax_error_rate = 0.05").unwrap();

        let config = CodecConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.decoder.tolerance, 0.1);
        assert_eq!(config.decoder.zero_threshold, 200);
        assert_eq!(config.thresholds.max_error_rate, 0.05);
        assert_eq!(config.thresholds.min_blank_ok_rate, 0.98);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = CodecConfig::from_toml_str("[decoder]\ntolerance = 0.1").unwrap();
        let overrides = Overrides {
            tolerance: Some(0.0),
            strict_pairs: true,
            search_window: Some(50),
            ..Overrides::default()
        };

        config.apply(&overrides).unwrap();
        assert_eq!(config.decoder.tolerance, 0.0);
        assert!(!config.decoder.accept_marginal_pairs);
        assert_eq!(config.sync.search_window, 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CodecConfig::from_toml_str("[decoder]\ntolerance = -0.5").is_err());
        assert!(CodecConfig::from_toml_str("[thresholds]\nmax_error_rate = 2.0").is_err());
        assert!(CodecConfig::from_toml_str("[decoder]\ntolerance = \"wide\"").is_err());

        let mut config = CodecConfig::default();
        let overrides = Overrides {
            min_blank_ok_rate: Some(1.5),
            ..Overrides::default()
        };
        assert!(config.apply(&overrides).is_err());
    }

    #[test]
    fn test_unreachable_lock_score_rejected() {
        let err = CodecConfig::from_toml_str("[thresholds]\nmin_lock_score = 4").unwrap_err();
        assert!(format!("{err:#}").contains("min_lock_score"));
        assert!(CodecConfig::from_toml_str("[thresholds]\nmin_lock_score = 0").is_err());
        assert!(CodecConfig::from_toml_str("[thresholds]\nmin_lock_score = 1").is_ok());

        let mut config = CodecConfig::default();
        let overrides = Overrides {
            min_lock_score: Some(10),
            ..Overrides::default()
        };
        assert!(config.apply(&overrides).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = CodecConfig::default();
        config.impairment.jitter_samples = 3;
        config.thresholds.min_lock_score = 2;

        let text = config.to_toml().unwrap();
        assert_eq!(CodecConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CodecConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("reading config"));
    }
}

//! Analysis configuration
//!
//! Every stage takes its paths and tuning constants from an explicit
//! `AnalysisConfig` instead of fixed locations. Configurations can be loaded
//! from JSON; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AnalysisError;

/// Default glob for analysis logs
pub const DEFAULT_LOG_PATTERN: &str = "analysis_output.*.log";

/// Default directory for the snapshot, charts and reports
pub const DEFAULT_OUTPUT_DIR: &str = "figures";

/// Default snapshot file name inside the output directory
pub const DEFAULT_SNAPSHOT_FILE: &str = "individual_entropies_extracted.csv";

/// Default name of the classifier output subdirectory
pub const DEFAULT_CONDITION_DIR: &str = "by_condition";

/// Configuration shared by the aggregation and analysis stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Glob selecting the log files to aggregate
    pub log_pattern: String,
    /// Directory receiving the snapshot, charts and text reports
    pub output_dir: PathBuf,
    /// Snapshot file name (relative to `output_dir`)
    pub snapshot_file: String,
    /// Bootstrap resamples for paired-difference confidence intervals
    pub bootstrap_iterations: usize,
    /// Seed for the bootstrap and trajectory sampling
    pub bootstrap_seed: u64,
    /// Minimum complete T01/T03 block pairs before a per-group paired test runs
    pub min_paired_blocks: usize,
    pub significance_level: f64,
    pub marginal_level: f64,
    /// Block trajectories drawn per group in trajectory charts
    pub trajectory_sample: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            log_pattern: DEFAULT_LOG_PATTERN.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            bootstrap_iterations: 5000,
            bootstrap_seed: 42,
            min_paired_blocks: 5,
            significance_level: 0.05,
            marginal_level: 0.10,
            trajectory_sample: 50,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::MissingInput(path.to_path_buf()));
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.log_pattern.trim().is_empty() {
            return Err(AnalysisError::Config("log_pattern must not be empty".to_string()));
        }
        if self.snapshot_file.trim().is_empty() {
            return Err(AnalysisError::Config("snapshot_file must not be empty".to_string()));
        }
        for (name, level) in [
            ("significance_level", self.significance_level),
            ("marginal_level", self.marginal_level),
        ] {
            if !(level > 0.0 && level < 1.0) {
                return Err(AnalysisError::Config(format!(
                    "{name} must lie in (0, 1), got {level}"
                )));
            }
        }
        if self.bootstrap_iterations == 0 {
            return Err(AnalysisError::Config(
                "bootstrap_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Full path of the CSV snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join(&self.snapshot_file)
    }

    /// Full path of an output artifact
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

/// Options for the trial-file classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOptions {
    /// Directory scanned recursively for trial files
    pub root: PathBuf,
    /// Name of the output subdirectory under `root`
    pub output_subdir: String,
}

impl ClassifierOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_subdir: DEFAULT_CONDITION_DIR.to_string(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output_subdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.log_pattern, "analysis_output.*.log");
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("figures").join("individual_entropies_extracted.csv")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AnalysisConfig::from_json(r#"{"output_dir": "out", "bootstrap_seed": 7}"#)
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.bootstrap_seed, 7);
        assert_eq!(config.bootstrap_iterations, 5000);
        assert_eq!(config.min_paired_blocks, 5);
    }

    #[test]
    fn test_invalid_levels_rejected() {
        let result = AnalysisConfig::from_json(r#"{"significance_level": 1.5}"#);
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_roundtrip() {
        let config = AnalysisConfig {
            trajectory_sample: 12,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(AnalysisConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_classifier_output_dir() {
        let options = ClassifierOptions::new("/data/gait_young_full");
        assert_eq!(
            options.output_dir(),
            PathBuf::from("/data/gait_young_full/by_condition")
        );
    }
}

//! Balance Entropy - aggregation and group statistics for gait/balance entropy
//!
//! Per-trial entropy values (symbolic and permutation entropy) are scattered
//! across analysis logs. This crate collects them into one table through a
//! deterministic pipeline: log adaptation → condition decomposition → CSV
//! snapshot → observation derivation → statistical analyses with SVG charts
//! and text reports.
//!
//! ## Modules
//!
//! - **Extraction**: section-scoped log parsing, Day/Block/Trial decomposition,
//!   multi-file aggregation and the snapshot
//! - **Analyses**: old vs young distributions, trial-level and within-block
//!   random-intercept models, per-group paired tests
//! - **Classifier**: copy raw trial files into per-condition folders with
//!   checksum verification

pub mod adapters;
pub mod analysis;
pub mod charts;
pub mod classifier;
pub mod condition;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod snapshot;
pub mod stats;
pub mod types;

pub use adapters::{EntropyLogAdapter, LogAdapter};
pub use analysis::{load_snapshot, LoadedSnapshot};
pub use classifier::{classify_plain, classify_verify, ClassifySummary};
pub use condition::ConditionDecomposer;
pub use config::{AnalysisConfig, ClassifierOptions};
pub use error::AnalysisError;
pub use pipeline::{aggregate_logs, extract, EntropyTable, ExtractOutcome};
pub use types::{LogRecord, Observation};

/// Crate version stamped on every report
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on every report
pub const PRODUCER_NAME: &str = "balance-entropy";

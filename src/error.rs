//! Error types for balance-entropy

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while aggregating or analysing entropy data
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Cannot read matched path: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Required input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Singular matrix in {0}")]
    SingularMatrix(String),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

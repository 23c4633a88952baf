//! Report provenance and text output

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::{PRODUCER_NAME, VERSION};

/// Producer metadata stamped on every report
#[derive(Debug, Clone, Serialize)]
pub struct ReportHeader {
    pub analysis: String,
    pub producer: String,
    pub version: String,
    pub run_id: String,
    pub generated_at_utc: String,
    /// Snapshot the analysis read (or wrote, for extraction)
    pub snapshot: String,
}

impl ReportHeader {
    pub fn new(analysis: &str, snapshot: &Path) -> Self {
        Self::at(analysis, snapshot, Utc::now())
    }

    pub fn at(analysis: &str, snapshot: &Path, generated_at: DateTime<Utc>) -> Self {
        Self {
            analysis: analysis.to_string(),
            producer: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            run_id: Uuid::new_v4().to_string(),
            generated_at_utc: generated_at.to_rfc3339(),
            snapshot: snapshot.display().to_string(),
        }
    }

    /// Title block for a text report
    pub fn banner(&self, title: &str, width: usize) -> String {
        let rule = "=".repeat(width);
        format!(
            "{rule}\n{title}\n{rule}\n{} {} | run {}\nGenerated: {}\nSnapshot: {}\n\n",
            self.producer, self.version, self.run_id, self.generated_at_utc, self.snapshot
        )
    }
}

/// Section heading in the house style
pub fn section(title: &str, width: usize) -> String {
    let rule = "=".repeat(width);
    format!("\n{rule}\n{title}\n{rule}\n")
}

/// Write a text report, creating the parent directory
pub fn write_text(path: &Path, text: &str) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, text)?;
    Ok(())
}

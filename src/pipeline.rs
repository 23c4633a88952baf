//! Pipeline orchestration
//!
//! This module provides the extraction entry points:
//! 1. Glob the analysis logs, sorted by path
//! 2. Parse each log through a `LogAdapter`
//! 3. Decompose conditions into Day/Block/Trial
//! 4. Persist the snapshot and render the individual-distribution charts

use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::{EntropyLogAdapter, LogAdapter};
use crate::analysis::individual::{self, IndividualReport};
use crate::condition::ConditionDecomposer;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::snapshot::write_snapshot;
use crate::types::LogRecord;

/// Aggregated records of one extraction run
#[derive(Debug, Clone, Default)]
pub struct EntropyTable {
    pub records: Vec<LogRecord>,
    pub files_scanned: usize,
}

impl EntropyTable {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of the `extract` stage
#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    /// No log contained an individual entropy entry; nothing was written
    Empty { files_scanned: usize },
    Extracted {
        snapshot: PathBuf,
        files_scanned: usize,
        report: IndividualReport,
    },
}

/// Base name of a log path, as recorded in the `logfile` column
fn logfile_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse every log matching `pattern` with `adapter`.
///
/// Files are visited in lexicographic path order and read as lossy UTF-8.
pub fn aggregate_logs(pattern: &str, adapter: &dyn LogAdapter) -> Result<EntropyTable, AnalysisError> {
    let mut paths = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    info!("found {} log files matching {pattern}", paths.len());

    let mut table = EntropyTable::default();
    for path in &paths {
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let records = adapter.parse(&text, &logfile_name(path));
        debug!("{}: {} records", path.display(), records.len());
        table.records.extend(records);
        table.files_scanned += 1;
    }

    ConditionDecomposer::apply(&mut table.records);
    info!(
        "aggregated {} records from {} files",
        table.records.len(),
        table.files_scanned
    );
    Ok(table)
}

/// Aggregate the configured logs, write the snapshot and the individual charts
pub fn extract(config: &AnalysisConfig) -> Result<ExtractOutcome, AnalysisError> {
    extract_with(config, &EntropyLogAdapter::new())
}

/// `extract` with a caller-supplied adapter
pub fn extract_with(config: &AnalysisConfig, adapter: &dyn LogAdapter) -> Result<ExtractOutcome, AnalysisError> {
    let table = aggregate_logs(&config.log_pattern, adapter)?;
    if table.is_empty() {
        return Ok(ExtractOutcome::Empty {
            files_scanned: table.files_scanned,
        });
    }

    let snapshot = config.snapshot_path();
    write_snapshot(&snapshot, &table.records)?;
    let report = individual::run(&table.records, config, &snapshot)?;
    Ok(ExtractOutcome::Extracted {
        snapshot,
        files_scanned: table.files_scanned,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::read_snapshot;
    use pretty_assertions::assert_eq;

    const LOG_A: &str = "\
preamble
--- Individual Entropy Results ---
Group: old
File: S001_G01_D01_B01_T01.csv, Symb: 1.50, Perm: 0.90
File: S001_G01_D01_B01_T02.csv, Symb: 1.55, Perm: 0.91
Group: young
File: S101_G02_D01_B01_T01.csv, Symb: 1.20, Perm: 0.80
--- Group Average Entropy Results ---
File: S999_G01_D01_B01_T01.csv, Symb: 9.0, Perm: 9.0
";

    const LOG_B: &str = "\
--- Individual Entropy Results ---
Group: young
File: S102_G02_D02_B03_T03.csv, Symb: 1.10, Perm: 0.70
--- Analysis Complete ---
";

    fn config_in(dir: &Path) -> AnalysisConfig {
        AnalysisConfig {
            log_pattern: dir.join("analysis_output.*.log").display().to_string(),
            output_dir: dir.join("figures"),
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregate_sorted_and_decomposed() {
        let dir = tempfile::tempdir().unwrap();
        // Written out of order; aggregation sorts by path
        fs::write(dir.path().join("analysis_output.2.log"), LOG_B).unwrap();
        fs::write(dir.path().join("analysis_output.1.log"), LOG_A).unwrap();
        fs::write(dir.path().join("unrelated.log"), LOG_B).unwrap();

        let config = config_in(dir.path());
        let table = aggregate_logs(&config.log_pattern, &EntropyLogAdapter::new()).unwrap();
        assert_eq!(table.files_scanned, 2);

        let files: Vec<&str> = table.records.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(
            files,
            vec![
                "S001_G01_D01_B01_T01.csv",
                "S001_G01_D01_B01_T02.csv",
                "S101_G02_D01_B01_T01.csv",
                "S102_G02_D02_B03_T03.csv",
            ]
        );
        assert_eq!(table.records[0].logfile, "analysis_output.1.log");
        assert_eq!(table.records[3].logfile, "analysis_output.2.log");
        assert_eq!(table.records[3].day.as_deref(), Some("D02"));
        assert_eq!(table.records[3].trial.as_deref(), Some("T03"));
        assert_eq!(table.records[2].group.as_deref(), Some("young"));
    }

    #[test]
    fn test_aggregate_lossy_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = LOG_B.as_bytes().to_vec();
        bytes.splice(0..0, [0xff, 0xfe, b'\n']);
        fs::write(dir.path().join("analysis_output.1.log"), bytes).unwrap();

        let config = config_in(dir.path());
        let table = aggregate_logs(&config.log_pattern, &EntropyLogAdapter::new()).unwrap();
        assert_eq!(table.records.len(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        let result = aggregate_logs("logs/[", &EntropyLogAdapter::new());
        assert!(matches!(result, Err(AnalysisError::Pattern(_))));
    }

    #[test]
    fn test_extract_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("analysis_output.1.log"), "no results here\n").unwrap();
        let config = config_in(dir.path());

        match extract(&config).unwrap() {
            ExtractOutcome::Empty { files_scanned } => assert_eq!(files_scanned, 1),
            other => panic!("expected empty outcome, got {other:?}"),
        }
        assert!(!config.snapshot_path().exists());
    }

    #[test]
    fn test_extract_writes_snapshot_and_charts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("analysis_output.1.log"), LOG_A).unwrap();
        fs::write(dir.path().join("analysis_output.2.log"), LOG_B).unwrap();
        let config = config_in(dir.path());

        let ExtractOutcome::Extracted {
            snapshot,
            files_scanned,
            report,
        } = extract(&config).unwrap()
        else {
            panic!("expected records");
        };
        assert_eq!(files_scanned, 2);
        assert_eq!(report.n_records, 4);
        assert!(report.charts.iter().all(|p| p.exists()));

        let records = read_snapshot(&snapshot).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].symb, 1.55);
        assert_eq!(records[1].subject.as_deref(), Some("S001"));
    }
}

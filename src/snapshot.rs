//! CSV snapshot of the aggregated entropy table
//!
//! The snapshot is written once per aggregation run and re-read by every
//! analysis. Absent values are stored as empty fields.

use log::info;
use std::fs;
use std::path::Path;

use crate::error::AnalysisError;
use crate::types::LogRecord;

/// Column order of the snapshot
pub const SNAPSHOT_COLUMNS: [&str; 10] = [
    "logfile", "group", "file", "subject", "condition", "symb", "perm", "Day", "Block", "Trial",
];

/// Write records to `path`, creating parent directories as needed
pub fn write_snapshot(path: &Path, records: &[LogRecord]) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(SNAPSHOT_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read a snapshot previously written by `write_snapshot`
pub fn read_snapshot(path: &Path) -> Result<Vec<LogRecord>, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::MissingInput(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<LogRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    info!("loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Serialize records to an in-memory CSV string
pub fn to_csv_string(records: &[LogRecord]) -> Result<String, AnalysisError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(SNAPSHOT_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AnalysisError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn records() -> Vec<LogRecord> {
        vec![
            LogRecord {
                logfile: "analysis_output.1.log".to_string(),
                group: Some("old".to_string()),
                file: "S001_G03_D01_B02_T03.csv".to_string(),
                subject: Some("S001".to_string()),
                condition: Some("G03_D01_B02_T03.csv".to_string()),
                symb: 0.1 + 0.2,
                perm: 1.0e-12,
                day: Some("D01".to_string()),
                block: Some("B02".to_string()),
                trial: Some("T03".to_string()),
            },
            LogRecord {
                logfile: "analysis_output.2.log".to_string(),
                group: None,
                file: "trial, \"quoted\".csv".to_string(),
                subject: None,
                condition: None,
                symb: -3.5,
                perm: 123456.789,
                day: None,
                block: None,
                trial: None,
            },
        ]
    }

    #[test]
    fn test_header_order() {
        let csv = to_csv_string(&records()).unwrap();
        let header = csv.lines().next().unwrap();
        assert_eq!(header, SNAPSHOT_COLUMNS.join(","));
    }

    #[test]
    fn test_empty_snapshot_has_header() {
        let csv = to_csv_string(&[]).unwrap();
        assert_eq!(csv.trim_end(), SNAPSHOT_COLUMNS.join(","));
    }

    #[test]
    fn test_file_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.csv");
        let original = records();

        write_snapshot(&path, &original).unwrap();
        let loaded = read_snapshot(&path).unwrap();

        assert_eq!(loaded, original);
        // Floats must survive bit-for-bit
        assert_eq!(loaded[0].symb.to_bits(), (0.1f64 + 0.2).to_bits());
    }

    #[test]
    fn test_parsed_tokens_with_empty_parts_roundtrip() {
        use crate::adapters::{EntropyLogAdapter, LogAdapter};

        let log = "--- Individual Entropy Results ---\n\
                   Group: old\n\
                   File: S001_, Symb: 1.0, Perm: 2.0\n\
                   File: _G03_D01_B01_T01.csv, Symb: 1.5, Perm: 2.5\n";
        let parsed = EntropyLogAdapter::new().parse(log, "analysis_output.1.log");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].condition, None);
        assert_eq!(parsed[1].subject, None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.csv");
        write_snapshot(&path, &parsed).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), parsed);
    }

    #[test]
    fn test_missing_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_snapshot(&dir.path().join("absent.csv"));
        assert!(matches!(result, Err(AnalysisError::MissingInput(_))));
    }
}

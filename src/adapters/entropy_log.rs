//! Section-scoped entropy log adapter
//!
//! Reads the "Individual Entropy Results" section of an analysis log and
//! extracts one record per `File:` line, with the group taken from the last
//! `Group:` label that precedes it.

use log::debug;
use regex::Regex;

use super::LogAdapter;
use crate::types::LogRecord;

/// Marker opening the section of per-file results
pub const INDIVIDUAL_RESULTS_MARKER: &str = "--- Individual Entropy Results ---";

/// Marker closing the per-file section (group averages follow)
pub const GROUP_AVERAGE_MARKER: &str = "--- Group Average Entropy Results ---";

/// Marker closing the per-file section (end of the analysis)
pub const ANALYSIS_COMPLETE_MARKER: &str = "--- Analysis Complete ---";

const NUMBER: &str = r"([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)";

/// Adapter for the entropy analysis log format
pub struct EntropyLogAdapter {
    group_re: Regex,
    file_re: Regex,
    whitespace_re: Regex,
    symb_re: Regex,
    perm_re: Regex,
    non_numeric_re: Regex,
}

impl Default for EntropyLogAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropyLogAdapter {
    pub fn new() -> Self {
        // All patterns are constant; a failure here is a programming error.
        Self {
            group_re: compile(r"Group:\s*(\w+)"),
            file_re: compile(r"(?m)^\s*File:\s*(.+)$"),
            whitespace_re: compile(r"\s+"),
            symb_re: compile(&format!(r"Symb:\s*{NUMBER}")),
            perm_re: compile(&format!(r"Perm:\s*{NUMBER}")),
            non_numeric_re: compile(r"[^0-9.+\-eE]"),
        }
    }

    /// Parse one `File:` payload (the text after `File:`).
    ///
    /// Returns `None` when the line has fewer than three comma-separated
    /// fields or either entropy value is missing.
    pub fn parse_file_line(&self, line: &str, group: Option<&str>, logfile: &str) -> Option<LogRecord> {
        let line = line.trim();
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            debug!("{logfile}: skipping short line {line:?}");
            return None;
        }
        let file = fields[0].to_string();

        // Wrapped values may carry stray whitespace inside the line
        let clean = self.whitespace_re.replace_all(line, " ");
        let symb = self.extract_number(&self.symb_re, &clean);
        let perm = self.extract_number(&self.perm_re, &clean);
        let (Some(symb), Some(perm)) = (symb, perm) else {
            debug!("{logfile}: skipping line without Symb/Perm values {line:?}");
            return None;
        };

        let (subject, condition) = split_file_token(&file);

        Some(LogRecord {
            logfile: logfile.to_string(),
            group: group.map(str::to_string),
            file,
            subject,
            condition,
            symb,
            perm,
            day: None,
            block: None,
            trial: None,
        })
    }

    fn extract_number(&self, re: &Regex, text: &str) -> Option<f64> {
        let raw = re.captures(text)?.get(1)?.as_str();
        raw.parse::<f64>().ok().or_else(|| {
            self.non_numeric_re
                .replace_all(raw, "")
                .parse::<f64>()
                .ok()
        })
    }

    /// Positions and names of every `Group:` label, in ascending position order
    fn group_labels<'t>(&self, section: &'t str) -> Vec<(usize, &'t str)> {
        self.group_re
            .captures_iter(section)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let label = caps.get(1)?;
                Some((whole.start(), label.as_str().trim()))
            })
            .collect()
    }
}

impl LogAdapter for EntropyLogAdapter {
    fn parse(&self, text: &str, logfile: &str) -> Vec<LogRecord> {
        let Some(section) = individual_section(text) else {
            debug!("{logfile}: no individual results section");
            return Vec::new();
        };

        // First pass: label positions. Second pass: each record takes the
        // greatest label position not past its own.
        let labels = self.group_labels(section);

        let mut records = Vec::new();
        for caps in self.file_re.captures_iter(section) {
            let (Some(whole), Some(payload)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let group = preceding_label(&labels, whole.start());
            if let Some(record) = self.parse_file_line(payload.as_str(), group, logfile) {
                records.push(record);
            }
        }

        debug!("{logfile}: {} records, {} group labels", records.len(), labels.len());
        records
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// Text between the start marker and the first following end marker (or end of text)
pub(crate) fn individual_section(text: &str) -> Option<&str> {
    let start = text.find(INDIVIDUAL_RESULTS_MARKER)? + INDIVIDUAL_RESULTS_MARKER.len();
    let rest = &text[start..];
    let end = [GROUP_AVERAGE_MARKER, ANALYSIS_COMPLETE_MARKER]
        .iter()
        .filter_map(|marker| rest.find(marker))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Label with the greatest position `<= pos`
fn preceding_label<'t>(labels: &[(usize, &'t str)], pos: usize) -> Option<&'t str> {
    let idx = labels.partition_point(|&(label_pos, _)| label_pos <= pos);
    idx.checked_sub(1).map(|i| labels[i].1)
}

/// Split a trial file token into subject and condition at the first underscore.
///
/// An empty side is absent, matching how the snapshot stores it.
pub(crate) fn split_file_token(file: &str) -> (Option<String>, Option<String>) {
    match file.split_once('_') {
        Some((subject, condition)) => (non_empty(subject), non_empty(condition)),
        None => (None, None),
    }
}

fn non_empty(part: &str) -> Option<String> {
    (!part.is_empty()).then(|| part.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_log() -> &'static str {
        "Loading data...\n\
         Group: ignored\n\
         --- Individual Entropy Results ---\n\
         File: S999_G01_D01_B01_T01.csv, Symb: 9.0, Perm: 9.0\n\
         Group: old\n\
         File: S001_G03_D01_B01_T01.csv, Symb: 1.234, Perm: 0.987\n\
         File: S001_G03_D01_B01_T02.csv, Symb: 1.5e-1, Perm: -2.0E+1\n\
         Group: young\n\
           File: S101_G03_D02_B03_T03.csv, Symb:  0.5 , Perm: .75\n\
         File: broken.csv, Symb: 0.1\n\
         File: S102_G03_D02_B03_T01.csv, Symb: n/a, Perm: 0.3\n\
         --- Group Average Entropy Results ---\n\
         Group: old\n\
         File: S000_after_end.csv, Symb: 1.0, Perm: 1.0\n"
    }

    #[test]
    fn test_missing_start_marker_yields_nothing() {
        let adapter = EntropyLogAdapter::new();
        let text = "Group: old\nFile: S001_D01_B01_T01.csv, Symb: 1.0, Perm: 1.0\n";
        assert!(adapter.parse(text, "a.log").is_empty());
        assert!(adapter.parse("", "a.log").is_empty());
    }

    #[test]
    fn test_section_bounds_and_group_assignment() {
        let adapter = EntropyLogAdapter::new();
        let records = adapter.parse(sample_log(), "analysis_output.1.log");

        let summary: Vec<(Option<&str>, &str)> = records
            .iter()
            .map(|r| (r.group.as_deref(), r.file.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (None, "S999_G01_D01_B01_T01.csv"),
                (Some("old"), "S001_G03_D01_B01_T01.csv"),
                (Some("old"), "S001_G03_D01_B01_T02.csv"),
                (Some("young"), "S101_G03_D02_B03_T03.csv"),
            ]
        );
        assert!(records.iter().all(|r| r.logfile == "analysis_output.1.log"));
    }

    #[test]
    fn test_numeric_forms() {
        let adapter = EntropyLogAdapter::new();
        let records = adapter.parse(sample_log(), "x.log");

        assert_eq!(records[1].symb, 1.234);
        assert_eq!(records[1].perm, 0.987);
        assert_eq!(records[2].symb, 0.15);
        assert_eq!(records[2].perm, -20.0);
        assert_eq!(records[3].symb, 0.5);
        assert_eq!(records[3].perm, 0.75);
    }

    #[test]
    fn test_end_marker_analysis_complete() {
        let adapter = EntropyLogAdapter::new();
        let text = "--- Individual Entropy Results ---\n\
                    Group: old\n\
                    File: S001_D01_B01_T01.csv, Symb: 1.0, Perm: 2.0\n\
                    --- Analysis Complete ---\n\
                    File: S002_D01_B01_T01.csv, Symb: 1.0, Perm: 2.0\n";
        let records = adapter.parse(text, "x.log");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject.as_deref(), Some("S001"));
    }

    #[test]
    fn test_earliest_end_marker_wins() {
        let text = format!(
            "{INDIVIDUAL_RESULTS_MARKER}\nA\n{ANALYSIS_COMPLETE_MARKER}\nB\n{GROUP_AVERAGE_MARKER}\nC"
        );
        assert_eq!(individual_section(&text), Some("\nA\n"));
    }

    #[test]
    fn test_parse_file_line_fields() {
        let adapter = EntropyLogAdapter::new();
        let rec = adapter
            .parse_file_line("trialA.csv, Symb: 0.732, Perm: 1.204", Some("old"), "x.log")
            .unwrap();
        assert_eq!(rec.symb, 0.732);
        assert_eq!(rec.perm, 1.204);
        assert_eq!(rec.file, "trialA.csv");
        assert_eq!(rec.subject, None);
        assert_eq!(rec.condition, None);

        assert!(adapter
            .parse_file_line("trialA.csv, Symb: 0.732 Perm: 1.204", None, "x.log")
            .is_none());
    }

    #[test]
    fn test_wrapped_whitespace_is_normalized() {
        let adapter = EntropyLogAdapter::new();
        let rec = adapter
            .parse_file_line("S001_D01_B01_T01.csv,\tSymb:\t\t0.25,   Perm:   0.5", None, "x.log")
            .unwrap();
        assert_eq!((rec.symb, rec.perm), (0.25, 0.5));
    }

    #[test]
    fn test_split_file_token() {
        assert_eq!(
            split_file_token("S001_G03_D01_B01_T01.csv"),
            (Some("S001".to_string()), Some("G03_D01_B01_T01.csv".to_string()))
        );
        // No special-casing of the leading letter
        assert_eq!(
            split_file_token("P7_x"),
            (Some("P7".to_string()), Some("x".to_string()))
        );
        assert_eq!(split_file_token("nounderscore.csv"), (None, None));
        assert_eq!(split_file_token("S001_"), (Some("S001".to_string()), None));
        assert_eq!(
            split_file_token("_G03_D01_B01_T01.csv"),
            (None, Some("G03_D01_B01_T01.csv".to_string()))
        );
    }

    #[test]
    fn test_preceding_label_binary_search() {
        let labels = vec![(10, "old"), (50, "young"), (90, "old")];
        assert_eq!(preceding_label(&labels, 0), None);
        assert_eq!(preceding_label(&labels, 10), Some("old"));
        assert_eq!(preceding_label(&labels, 49), Some("old"));
        assert_eq!(preceding_label(&labels, 50), Some("young"));
        assert_eq!(preceding_label(&labels, 1000), Some("old"));
        assert_eq!(preceding_label(&[], 5), None);
    }
}

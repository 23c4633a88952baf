//! Condition decomposition
//!
//! Splits a free-text condition label such as `G03_D01_B02_T03` into its
//! Day, Block and Trial tokens.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{ConditionParts, LogRecord};

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(D\d{2})_(B\d{2})_(T\d{2})")
            .unwrap_or_else(|e| panic!("invalid condition pattern: {e}"))
    })
}

/// Decomposer for trial condition labels
pub struct ConditionDecomposer;

impl ConditionDecomposer {
    /// Find the first contiguous `Dxx_Bxx_Txx` run in `condition`.
    ///
    /// Returns `None` when the input is absent or the run does not occur;
    /// there is no partial match.
    pub fn decompose(condition: Option<&str>) -> Option<ConditionParts> {
        let caps = pattern().captures(condition?)?;
        Some(ConditionParts {
            day: caps.get(1)?.as_str().to_string(),
            block: caps.get(2)?.as_str().to_string(),
            trial: caps.get(3)?.as_str().to_string(),
        })
    }

    /// Populate Day/Block/Trial of every record from its condition
    pub fn apply(records: &mut [LogRecord]) {
        for record in records.iter_mut() {
            let parts = Self::decompose(record.condition.as_deref());
            record.set_condition_parts(parts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(day: &str, block: &str, trial: &str) -> ConditionParts {
        ConditionParts {
            day: day.to_string(),
            block: block.to_string(),
            trial: trial.to_string(),
        }
    }

    #[test]
    fn test_decompose_embedded_run() {
        assert_eq!(
            ConditionDecomposer::decompose(Some("G03_D01_B02_T03_extra")),
            Some(parts("D01", "B02", "T03"))
        );
        assert_eq!(
            ConditionDecomposer::decompose(Some("G03_D02_B01_T01.csv")),
            Some(parts("D02", "B01", "T01"))
        );
    }

    #[test]
    fn test_decompose_no_match() {
        assert_eq!(ConditionDecomposer::decompose(Some("no-pattern-here")), None);
        assert_eq!(ConditionDecomposer::decompose(None), None);
        assert_eq!(ConditionDecomposer::decompose(Some("")), None);
    }

    #[test]
    fn test_decompose_requires_contiguous_order() {
        assert_eq!(ConditionDecomposer::decompose(Some("D01_T03_B02")), None);
        assert_eq!(ConditionDecomposer::decompose(Some("D01_X_B02_T03")), None);
        assert_eq!(ConditionDecomposer::decompose(Some("D1_B02_T03")), None);
    }

    #[test]
    fn test_first_run_wins() {
        assert_eq!(
            ConditionDecomposer::decompose(Some("D01_B01_T01_D02_B02_T02")),
            Some(parts("D01", "B01", "T01"))
        );
    }

    #[test]
    fn test_apply_to_records() {
        let mut records = vec![LogRecord {
            logfile: "a.log".to_string(),
            group: None,
            file: "S001_G03_D01_B02_T03.csv".to_string(),
            subject: Some("S001".to_string()),
            condition: Some("G03_D01_B02_T03.csv".to_string()),
            symb: 1.0,
            perm: 1.0,
            day: None,
            block: None,
            trial: None,
        }];
        ConditionDecomposer::apply(&mut records);
        assert_eq!(records[0].day.as_deref(), Some("D01"));
        assert_eq!(records[0].block.as_deref(), Some("B02"));
        assert_eq!(records[0].trial.as_deref(), Some("T03"));
    }
}

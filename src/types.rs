//! Core types for the balance-entropy pipeline
//!
//! This module defines the data structures that flow through each stage:
//! parsed log records, decomposed trial conditions, and the modelling
//! observations derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Group label used for the older cohort
pub const GROUP_OLD: &str = "old";

/// Group label used for the younger cohort
pub const GROUP_YOUNG: &str = "young";

/// Number of trials recorded per block
pub const TRIALS_PER_BLOCK: u32 = 3;

/// One parsed entry from the "Individual Entropy Results" section of a log.
///
/// Field names and order match the CSV snapshot columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Base name of the log file the record came from
    pub logfile: String,
    /// Last group label preceding the record, if any
    pub group: Option<String>,
    /// Raw trial file token (e.g. `S001_G03_D01_B01_T01.csv`)
    pub file: String,
    /// Part of `file` before the first underscore
    pub subject: Option<String>,
    /// Part of `file` after the first underscore
    pub condition: Option<String>,
    /// Symbolic entropy
    pub symb: f64,
    /// Permutation entropy
    pub perm: f64,
    #[serde(rename = "Day")]
    pub day: Option<String>,
    #[serde(rename = "Block")]
    pub block: Option<String>,
    #[serde(rename = "Trial")]
    pub trial: Option<String>,
}

impl LogRecord {
    /// Day/Block/Trial of this record, present only when all three are set
    pub fn condition_parts(&self) -> Option<ConditionParts> {
        match (&self.day, &self.block, &self.trial) {
            (Some(day), Some(block), Some(trial)) => Some(ConditionParts {
                day: day.clone(),
                block: block.clone(),
                trial: trial.clone(),
            }),
            _ => None,
        }
    }

    /// Store decomposed condition parts (or clear them)
    pub fn set_condition_parts(&mut self, parts: Option<ConditionParts>) {
        match parts {
            Some(p) => {
                self.day = Some(p.day);
                self.block = Some(p.block);
                self.trial = Some(p.trial);
            }
            None => {
                self.day = None;
                self.block = None;
                self.trial = None;
            }
        }
    }

    /// True when the record belongs to the given group label
    pub fn is_group(&self, label: &str) -> bool {
        self.group.as_deref() == Some(label)
    }
}

/// Day, Block and Trial tokens extracted from a condition string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionParts {
    /// `Dxx`
    pub day: String,
    /// `Bxx`
    pub block: String,
    /// `Txx`
    pub trial: String,
}

impl ConditionParts {
    pub fn day_num(&self) -> Option<u32> {
        token_number(&self.day)
    }

    pub fn block_num(&self) -> Option<u32> {
        token_number(&self.block)
    }

    pub fn trial_num(&self) -> Option<u32> {
        token_number(&self.trial)
    }
}

impl fmt::Display for ConditionParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.day, self.block, self.trial)
    }
}

/// Numeric suffix of a one-letter token such as `D01` or `T03`
fn token_number(token: &str) -> Option<u32> {
    token.get(1..)?.parse().ok()
}

/// A record lifted for modelling: every field needed by the analyses is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub subject: String,
    pub group: String,
    pub day: String,
    pub block: String,
    pub day_num: u32,
    pub block_num: u32,
    /// Position of the trial within its block (1..=3)
    pub trial_within_block: u32,
    /// Position of the trial within the day (1..=9)
    pub trial_number: u32,
    /// `<subject>_<Day>_<Block>`
    pub block_id: String,
    pub symb: f64,
    pub perm: f64,
}

impl Observation {
    pub fn is_group(&self, label: &str) -> bool {
        self.group == label
    }
}

/// Significance marker used in reports and charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    /// p < 0.001
    VeryStrong,
    /// p < 0.01
    Strong,
    /// p < 0.05
    Significant,
    /// p < 0.10
    Marginal,
    NotSignificant,
}

impl Significance {
    pub fn from_p(p: f64) -> Self {
        if p < 0.001 {
            Significance::VeryStrong
        } else if p < 0.01 {
            Significance::Strong
        } else if p < 0.05 {
            Significance::Significant
        } else if p < 0.10 {
            Significance::Marginal
        } else {
            Significance::NotSignificant
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Significance::VeryStrong => "***",
            Significance::Strong => "**",
            Significance::Significant => "*",
            Significance::Marginal => "†",
            Significance::NotSignificant => "n.s.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LogRecord {
        LogRecord {
            logfile: "analysis_output.1.log".to_string(),
            group: Some("old".to_string()),
            file: "S001_G03_D01_B02_T03.csv".to_string(),
            subject: Some("S001".to_string()),
            condition: Some("G03_D01_B02_T03.csv".to_string()),
            symb: 1.5,
            perm: 0.9,
            day: None,
            block: None,
            trial: None,
        }
    }

    #[test]
    fn test_condition_parts_all_or_nothing() {
        let mut rec = record();
        assert!(rec.condition_parts().is_none());

        rec.day = Some("D01".to_string());
        rec.block = Some("B02".to_string());
        assert!(rec.condition_parts().is_none());

        rec.trial = Some("T03".to_string());
        let parts = rec.condition_parts().unwrap();
        assert_eq!(parts.to_string(), "D01_B02_T03");
        assert_eq!(parts.day_num(), Some(1));
        assert_eq!(parts.block_num(), Some(2));
        assert_eq!(parts.trial_num(), Some(3));
    }

    #[test]
    fn test_set_condition_parts_clears() {
        let mut rec = record();
        rec.set_condition_parts(Some(ConditionParts {
            day: "D02".to_string(),
            block: "B01".to_string(),
            trial: "T01".to_string(),
        }));
        assert_eq!(rec.day.as_deref(), Some("D02"));

        rec.set_condition_parts(None);
        assert!(rec.day.is_none() && rec.block.is_none() && rec.trial.is_none());
    }

    #[test]
    fn test_significance_markers() {
        assert_eq!(Significance::from_p(0.0005).marker(), "***");
        assert_eq!(Significance::from_p(0.005).marker(), "**");
        assert_eq!(Significance::from_p(0.03).marker(), "*");
        assert_eq!(Significance::from_p(0.07).marker(), "†");
        assert_eq!(Significance::from_p(0.5).marker(), "n.s.");
    }
}

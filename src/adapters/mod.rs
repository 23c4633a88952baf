//! Log adapters
//!
//! This module provides adapters that scan the text of one analysis log and
//! map the entries they recognise to `LogRecord`s.

mod entropy_log;

pub use entropy_log::{
    EntropyLogAdapter, GROUP_AVERAGE_MARKER, INDIVIDUAL_RESULTS_MARKER, ANALYSIS_COMPLETE_MARKER,
};

use crate::types::LogRecord;

/// Trait for log adapters
pub trait LogAdapter {
    /// Parse the text of one log file.
    ///
    /// `logfile` is recorded on every produced record. Adapters are
    /// best-effort: malformed entries are skipped, never reported as errors.
    fn parse(&self, text: &str, logfile: &str) -> Vec<LogRecord>;
}

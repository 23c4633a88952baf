//! Per-subject entropy distributions by group and by day

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::ReportHeader;
use crate::charts::{self, Annotation, Category, DistributionPanel, Panel};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::stats::{rank_sum, RankSum};
use crate::types::{LogRecord, GROUP_OLD, GROUP_YOUNG};

pub const OVERALL_CHART: &str = "individual_symb_entropy_overall.svg";
pub const BY_DAY_CHART: &str = "individual_symb_entropy_by_day.svg";

/// Old vs young rank-sum test within one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayComparison {
    pub day: String,
    pub n_old: usize,
    pub n_young: usize,
    pub test: Option<RankSum>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndividualReport {
    pub header: ReportHeader,
    pub n_records: usize,
    pub group_counts: BTreeMap<String, usize>,
    pub overall: Option<RankSum>,
    pub by_day: Vec<DayComparison>,
    pub charts: Vec<PathBuf>,
}

fn symb_where(records: &[LogRecord], pred: impl Fn(&LogRecord) -> bool) -> Vec<f64> {
    records
        .iter()
        .filter(|r| pred(r))
        .map(|r| r.symb)
        .filter(|v| v.is_finite())
        .collect()
}

/// `Old`, `Young`: first letter upper-cased, rest lower-cased
fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Overall old vs young rank-sum test
pub fn overall_test(records: &[LogRecord]) -> Option<RankSum> {
    let old = symb_where(records, |r| r.is_group(GROUP_OLD));
    let young = symb_where(records, |r| r.is_group(GROUP_YOUNG));
    rank_sum(&old, &young)
}

/// Per-day comparisons for every parsed day, in sorted order
pub fn day_comparisons(records: &[LogRecord]) -> Vec<DayComparison> {
    let days: BTreeSet<&str> = records.iter().filter_map(|r| r.day.as_deref()).collect();
    days.into_iter()
        .map(|day| {
            let old = symb_where(records, |r| r.day.as_deref() == Some(day) && r.is_group(GROUP_OLD));
            let young = symb_where(records, |r| {
                r.day.as_deref() == Some(day) && r.is_group(GROUP_YOUNG)
            });
            DayComparison {
                day: day.to_string(),
                n_old: old.len(),
                n_young: young.len(),
                test: rank_sum(&old, &young),
            }
        })
        .collect()
}

/// Analyse the aggregated records and render both distribution charts
pub fn run(
    records: &[LogRecord],
    config: &AnalysisConfig,
    snapshot: &Path,
) -> Result<IndividualReport, AnalysisError> {
    let header = ReportHeader::new("individual", snapshot);
    let overall = overall_test(records);
    let by_day = day_comparisons(records);

    let mut group_counts = BTreeMap::new();
    for record in records {
        if let Some(group) = &record.group {
            *group_counts.entry(group.clone()).or_insert(0) += 1;
        }
    }

    let overall_path = config.output_path(OVERALL_CHART);
    charts::render(
        &overall_path,
        "Individual symbolic entropy",
        1,
        &[Panel::Distribution(overall_panel(records, overall.as_ref()))],
    )?;

    let by_day_path = config.output_path(BY_DAY_CHART);
    charts::render(
        &by_day_path,
        "Individual symbolic entropy by day",
        1,
        &[Panel::Distribution(by_day_panel(records, &by_day))],
    )?;

    Ok(IndividualReport {
        header,
        n_records: records.len(),
        group_counts,
        overall,
        by_day,
        charts: vec![overall_path, by_day_path],
    })
}

fn overall_panel(records: &[LogRecord], overall: Option<&RankSum>) -> DistributionPanel {
    let mut labels: Vec<&str> = vec![GROUP_OLD, GROUP_YOUNG];
    let others: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| r.group.as_deref())
        .filter(|g| *g != GROUP_OLD && *g != GROUP_YOUNG)
        .collect();
    labels.extend(others);

    let categories = labels
        .into_iter()
        .map(|label| Category {
            label: label.to_string(),
            values: symb_where(records, |r| r.is_group(label)),
            color: charts::group_color(label),
        })
        .collect();

    let title = match overall {
        Some(test) => format!("Symbolic Entropy per subject (ranksum p={:.4})", test.p_value),
        None => "Symbolic Entropy per subject".to_string(),
    };
    DistributionPanel {
        title,
        y_desc: "Symbolic Entropy (per-subject)".into(),
        categories,
        annotations: Vec::new(),
    }
}

fn by_day_panel(records: &[LogRecord], by_day: &[DayComparison]) -> DistributionPanel {
    let mut categories = Vec::new();
    let mut annotations = Vec::new();

    if by_day.is_empty() {
        // No parsed days: one box per "Unknown <Group>"
        let groups: BTreeSet<&str> = records.iter().filter_map(|r| r.group.as_deref()).collect();
        for group in groups {
            categories.push(Category {
                label: format!("Unknown {}", capitalize(group)),
                values: symb_where(records, |r| r.day.is_none() && r.is_group(group)),
                color: charts::group_color(group),
            });
        }
    }

    for (i, cmp) in by_day.iter().enumerate() {
        for group in [GROUP_OLD, GROUP_YOUNG] {
            categories.push(Category {
                label: format!("{} {}", cmp.day, capitalize(group)),
                values: symb_where(records, |r| {
                    r.day.as_deref() == Some(cmp.day.as_str()) && r.is_group(group)
                }),
                color: charts::group_color(group),
            });
        }
        if cmp.n_old > 0 && cmp.n_young > 0 {
            let (text, highlight) = match &cmp.test {
                Some(t) if t.p_value < 0.05 => (format!("p={:.3} *", t.p_value), true),
                Some(t) => (format!("p={:.3}", t.p_value), false),
                None => ("n/a".to_string(), false),
            };
            annotations.push(Annotation {
                x: i as f64 * 2.0 + 0.5,
                text,
                highlight,
            });
        }
    }

    DistributionPanel {
        title: "Symbolic Entropy per subject by Day and Group".into(),
        y_desc: "Symbolic Entropy (per-subject)".into(),
        categories,
        annotations,
    }
}

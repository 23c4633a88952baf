//! Old vs young group difference in symbolic entropy

use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::{write_text, LoadedSnapshot, ReportHeader};
use crate::charts::{self, Annotation, Bar, BarPanel, Category, DistributionPanel, Panel};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::stats::{cohens_d_pooled, mann_whitney_u, Alternative, MannWhitney, Summary};
use crate::types::{LogRecord, GROUP_OLD, GROUP_YOUNG};

pub const CHART: &str = "enhanced_group_comparison.svg";
pub const SUMMARY: &str = "group_differences_summary.txt";

/// Old vs young statistics
#[derive(Debug, Clone, Serialize)]
pub struct GroupComparison {
    pub old: Summary,
    pub young: Summary,
    /// One-sided test, old > young
    pub mann_whitney: Option<MannWhitney>,
    pub cohens_d: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDiffReport {
    pub header: ReportHeader,
    #[serde(flatten)]
    pub comparison: GroupComparison,
    pub chart: PathBuf,
    pub summary: PathBuf,
}

fn group_symb(records: &[LogRecord], label: &str) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.is_group(label))
        .map(|r| r.symb)
        .filter(|v| v.is_finite())
        .collect()
}

/// Statistics only; no files are written
pub fn compare(records: &[LogRecord]) -> Result<GroupComparison, AnalysisError> {
    let old = group_symb(records, GROUP_OLD);
    let young = group_symb(records, GROUP_YOUNG);
    if old.is_empty() || young.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "need both groups, found {} old and {} young records",
            old.len(),
            young.len()
        )));
    }
    Ok(GroupComparison {
        old: Summary::of(&old),
        young: Summary::of(&young),
        mann_whitney: mann_whitney_u(&old, &young, Alternative::Greater),
        cohens_d: cohens_d_pooled(&old, &young),
    })
}

pub fn run(snapshot: &LoadedSnapshot, config: &AnalysisConfig) -> Result<GroupDiffReport, AnalysisError> {
    let header = ReportHeader::new("group_diff", &snapshot.path);
    let comparison = compare(&snapshot.records)?;

    let chart = config.output_path(CHART);
    let panels = chart_panels(&snapshot.records, &comparison);
    charts::render(&chart, "Group comparison of symbolic entropy", 2, &panels)?;

    let report = GroupDiffReport {
        header,
        comparison,
        chart,
        summary: config.output_path(SUMMARY),
    };
    write_text(&report.summary, &render_text(&report))?;
    Ok(report)
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
}

/// Summary statistics block
pub fn render_text(report: &GroupDiffReport) -> String {
    let cmp = &report.comparison;
    let mut out = report.header.banner("GROUP DIFFERENCES: SYMBOLIC ENTROPY", 70);
    out.push_str("Summary Statistics:\n");
    for (name, s) in [("Old", &cmp.old), ("Young", &cmp.young)] {
        writeln!(out, "{name} Group:").ok();
        writeln!(
            out,
            "Mean ± SD: {} ± {}",
            fmt_opt(s.mean, 3),
            fmt_opt(s.sd, 3)
        ).ok();
        writeln!(out, "SEM: {}", fmt_opt(s.sem, 4)).ok();
        writeln!(out, "Median: {}", fmt_opt(s.median, 3)).ok();
        writeln!(out, "N = {}\n", s.n).ok();
    }
    match &cmp.mann_whitney {
        Some(mw) => {
            writeln!(out, "Mann-Whitney U (old > young): U = {:.1}", mw.u).ok();
            writeln!(out, "Mann-Whitney U test p-value: {:.4}", mw.p_value).ok();
        }
        None => out.push_str("Mann-Whitney U test: not computable\n"),
    }
    writeln!(out, "Cohen's d: {}", fmt_opt(cmp.cohens_d, 3)).ok();
    out
}

fn chart_panels(records: &[LogRecord], cmp: &GroupComparison) -> Vec<Panel> {
    let (old, young) = (&cmp.old, &cmp.young);
    let mw = cmp.mann_whitney.as_ref();
    let cohens_d = cmp.cohens_d;
    let p_text = mw.map_or_else(|| "n/a".to_string(), |m| format!("{:.2e}", m.p_value));
    let d_text = fmt_opt(cohens_d, 3);

    let distribution = DistributionPanel {
        title: format!(
            "A. Medians: old {} / young {}",
            fmt_opt(old.median, 3),
            fmt_opt(young.median, 3)
        ),
        y_desc: "Symbolic Entropy".into(),
        categories: [GROUP_OLD, GROUP_YOUNG]
            .into_iter()
            .map(|g| Category {
                label: g.to_string(),
                values: group_symb(records, g),
                color: charts::group_color(g),
            })
            .collect(),
        annotations: vec![Annotation {
            x: 0.3,
            text: format!("Old > Young: p={p_text}, d={d_text}"),
            highlight: false,
        }],
    };

    let means = BarPanel {
        title: format!(
            "B. Group Means (p={})",
            mw.map_or_else(|| "n/a".to_string(), |m| format!("{:.4}", m.p_value))
        ),
        y_desc: "Mean Symbolic Entropy (± SEM)".into(),
        bars: [("Old", GROUP_OLD, old), ("Young", GROUP_YOUNG, young)]
            .into_iter()
            .map(|(label, g, s)| Bar {
                label: label.to_string(),
                value: s.mean.unwrap_or(0.0),
                error: s.sem,
                color: charts::group_color(g),
                note: None,
            })
            .collect(),
    };

    vec![Panel::Distribution(distribution), Panel::Bars(means)]
}

//! Within-block trial analysis run separately for each age group
//!
//! For old and young subjects independently: a simple and a day-adjusted
//! random-intercept model of `symb` on trial position, block-level paired
//! T01 vs T03 tests with a bootstrap interval, and a pooled OLS regression
//! that ignores clustering.

use log::info;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::{
    marker, paired_blocks, position_distribution, position_stats, sample_trajectories, section,
    trial_label, trial_within_block, verdict, within_group_frame, write_text, GroupTrend,
    LoadedSnapshot, ModelReport, PositionStats, ReportHeader,
};
use crate::charts::{
    self, Bar, BarPanel, Category, DistributionPanel, Panel, Trajectory, TrendPanel,
};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::{distinct, ObservationSet};
use crate::stats::{
    bootstrap_mean_ci, cohens_d_paired, linear_fit, mean, paired_t_test, pearson, Coefficient,
    ConfidenceInterval, Correlation, LinearFit, TTest,
};
use crate::types::{Observation, GROUP_OLD, GROUP_YOUNG};

pub const CHART: &str = "within_block_by_group_comparison.svg";
pub const RESULTS: &str = "within_block_by_group_results.txt";
pub const X_NAME: &str = "Trial_within_block";
pub const SIMPLE_FORMULA: &str = "symb ~ Trial_within_block";
pub const DAY_FORMULA: &str = "symb ~ Trial_within_block + Day_num + Trial_within_block:Day_num";

const WIDTH: usize = 80;

/// Block-level T01 vs T03 test with effect size and bootstrap interval
#[derive(Debug, Clone, Serialize)]
pub struct PairedTest {
    pub n_blocks: usize,
    /// Test of T01 - T03, so an increase gives a negative t
    pub test: Option<TTest>,
    /// Mean of T03 - T01
    pub mean_diff: f64,
    pub ci: Option<ConfidenceInterval>,
    pub cohens_d: Option<f64>,
    #[serde(skip)]
    pub diffs: Vec<f64>,
}

impl PairedTest {
    pub fn p_value(&self) -> Option<f64> {
        self.test.as_ref().map(|t| t.p_value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupResult {
    pub group: String,
    pub n_rows: usize,
    pub n_subjects: usize,
    pub n_blocks: usize,
    pub simple: ModelReport,
    pub with_day: ModelReport,
    pub positions: Vec<PositionStats>,
    /// Mean at T03 minus mean at T01
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub paired: Option<PairedTest>,
    /// Pooled OLS of symb on position, ignoring clustering
    pub regression: Option<LinearFit>,
    pub correlation: Option<Correlation>,
}

impl GroupResult {
    fn position_mean(&self, position: u32) -> Option<f64> {
        self.positions
            .iter()
            .find(|p| p.position == position)
            .map(|p| p.mean)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupWithinBlockReport {
    pub header: ReportHeader,
    pub n_rows: usize,
    pub n_subjects: usize,
    pub groups: Vec<GroupResult>,
    pub chart: PathBuf,
    pub results: PathBuf,
}

impl GroupWithinBlockReport {
    pub fn group(&self, label: &str) -> Option<&GroupResult> {
        self.groups.iter().find(|g| g.group == label)
    }
}

/// Paired T01/T03 test; `None` below `min_blocks` complete pairs
pub fn paired_test(observations: &[&Observation], config: &AnalysisConfig) -> Option<PairedTest> {
    let pairs = paired_blocks(observations, 1, 3);
    if pairs.is_empty() || pairs.len() < config.min_paired_blocks {
        return None;
    }
    let first: Vec<f64> = pairs.iter().map(|p| p.first).collect();
    let last: Vec<f64> = pairs.iter().map(|p| p.last).collect();
    let diffs: Vec<f64> = pairs.iter().map(|p| p.last - p.first).collect();
    Some(PairedTest {
        n_blocks: pairs.len(),
        test: paired_t_test(&first, &last),
        mean_diff: mean(&diffs)?,
        ci: bootstrap_mean_ci(&diffs, config.bootstrap_iterations, config.bootstrap_seed, 0.95),
        cohens_d: cohens_d_paired(&diffs),
        diffs,
    })
}

/// Every statistic for one group
pub fn analyze_group(observations: &[&Observation], group: &str, config: &AnalysisConfig) -> GroupResult {
    info!("{group}: {} observations", observations.len());
    let simple = ModelReport::fit(
        SIMPLE_FORMULA,
        &within_group_frame(observations, X_NAME, trial_within_block, false),
    );
    let with_day = ModelReport::fit(
        DAY_FORMULA,
        &within_group_frame(observations, X_NAME, trial_within_block, true),
    );

    let xs: Vec<f64> = observations.iter().map(|o| trial_within_block(o)).collect();
    let ys: Vec<f64> = observations.iter().map(|o| o.symb).collect();

    let mut result = GroupResult {
        group: group.to_string(),
        n_rows: observations.len(),
        n_subjects: distinct(observations.iter().map(|o| o.subject.as_str())),
        n_blocks: distinct(observations.iter().map(|o| o.block_id.as_str())),
        simple,
        with_day,
        positions: position_stats(observations, |o| o.trial_within_block),
        change: None,
        percent_change: None,
        paired: paired_test(observations, config),
        regression: linear_fit(&xs, &ys),
        correlation: pearson(&xs, &ys),
    };
    if let (Some(t01), Some(t03)) = (result.position_mean(1), result.position_mean(3)) {
        let change = t03 - t01;
        result.change = Some(change);
        result.percent_change = (t01 != 0.0).then(|| change / t01 * 100.0);
    }
    result
}

pub fn run(
    snapshot: &LoadedSnapshot,
    config: &AnalysisConfig,
) -> Result<GroupWithinBlockReport, AnalysisError> {
    let set = &snapshot.observations;
    if set.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "no records with subject, group and Day/Block/Trial".into(),
        ));
    }
    let header = ReportHeader::new("group_within_block", &snapshot.path);
    let groups = [GROUP_OLD, GROUP_YOUNG]
        .into_iter()
        .map(|g| analyze_group(&set.group(g), g, config))
        .collect();

    let report = GroupWithinBlockReport {
        header,
        n_rows: set.len(),
        n_subjects: set.subject_count(),
        groups,
        chart: config.output_path(CHART),
        results: config.output_path(RESULTS),
    };

    charts::render(
        &report.chart,
        "Within-block trial effect by age group",
        3,
        &chart_panels(set, &report, config),
    )?;
    write_text(&report.results, &render_text(&report, config))?;
    Ok(report)
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
}

fn trend_panel(title: String) -> TrendPanel {
    TrendPanel {
        title,
        x_desc: "Trial Position Within Block".into(),
        y_desc: "Symbolic Entropy".into(),
        x_tick_prefix: Some("T".into()),
        series: Vec::new(),
        trajectories: Vec::new(),
        note: None,
    }
}

fn chart_panels(set: &ObservationSet, report: &GroupWithinBlockReport, config: &AnalysisConfig) -> Vec<Panel> {
    let position = |o: &Observation| o.trial_within_block;
    let groups = [GROUP_OLD, GROUP_YOUNG];

    // Row 1: per-group trends with the model estimate, then both together
    let mut panels: Vec<Panel> = Vec::new();
    for g in groups {
        let trend = GroupTrend::of(&set.group(g), g, position);
        let label = match &trend.fit {
            Some(fit) => format!("Mean ± SEM (slope={:.4})", fit.slope),
            None => "Mean ± SEM".to_string(),
        };
        let mut panel = trend_panel(format!("{} Group: Within-Block Entropy Trend", g.to_uppercase()));
        panel.series.push(trend.series(label));
        panel.note = report
            .group(g)
            .and_then(|r| r.simple.coefficient(X_NAME))
            .map(|c| {
                format!(
                    "Mixed model:\nβ={:.5}\np={:.4} {}",
                    c.estimate,
                    c.p_value,
                    marker(c.p_value)
                )
            });
        panels.push(Panel::Trend(panel));
    }
    let mut direct = trend_panel("Direct Comparison (Mean Entropy)".into());
    for g in groups {
        let mut series = GroupTrend::of(&set.group(g), g, position).series(g.to_uppercase());
        series.fit = None;
        for p in &mut series.points {
            p.sem = None;
        }
        direct.series.push(series);
    }
    panels.push(Panel::Trend(direct));

    // Row 2: sampled block trajectories per group, then the paired differences
    for g in groups {
        let obs = set.group(g);
        let mut panel = trend_panel(format!("{} Group: Individual Block Trajectories", g.to_uppercase()));
        panel.trajectories = sample_trajectories(&obs, config.trajectory_sample, config.bootstrap_seed)
            .into_iter()
            .map(|t| Trajectory {
                color: charts::group_color(g),
                points: t.points,
            })
            .collect();
        let mut mean_line = GroupTrend::of(&obs, g, position).series("Group Mean".into());
        mean_line.color = charts::NEUTRAL_COLOR;
        mean_line.fit = None;
        panel.series.push(mean_line);
        panels.push(Panel::Trend(panel));
    }
    panels.push(Panel::Distribution(DistributionPanel {
        title: "Distribution of Within-Block Changes (T03 - T01)".into(),
        y_desc: "Entropy Change (T03 - T01)".into(),
        categories: groups
            .into_iter()
            .map(|g| Category {
                label: g.to_uppercase(),
                values: report
                    .group(g)
                    .and_then(|r| r.paired.as_ref())
                    .map(|p| p.diffs.clone())
                    .unwrap_or_default(),
                color: charts::group_color(g),
            })
            .collect(),
        annotations: Vec::new(),
    }));

    // Row 3: per-position distributions, then effect sizes
    for g in groups {
        panels.push(Panel::Distribution(position_distribution(
            &set.group(g),
            g,
            format!("{} Group: Distribution by Trial Position", g.to_uppercase()),
            position,
            trial_label,
        )));
    }
    panels.push(Panel::Bars(BarPanel {
        title: "Effect Size Comparison (Paired T01 vs T03)".into(),
        y_desc: "Cohen's d".into(),
        bars: groups
            .into_iter()
            .filter_map(|g| {
                let paired = report.group(g)?.paired.as_ref()?;
                Some(Bar {
                    label: g.to_uppercase(),
                    value: paired.cohens_d.unwrap_or(0.0),
                    error: None,
                    color: charts::group_color(g),
                    note: Some(match paired.p_value() {
                        Some(p) => format!("d={} {}", fmt_opt(paired.cohens_d, 3), marker(p)),
                        None => format!("d={}", fmt_opt(paired.cohens_d, 3)),
                    }),
                })
            })
            .collect(),
    }));
    panels
}

fn write_coefficient(out: &mut String, model: &ModelReport, config: &AnalysisConfig) {
    match model.coefficient(X_NAME) {
        Some(c) => {
            writeln!(out, "  Trial coefficient: {:.6}", c.estimate).ok();
            writeln!(out, "  p-value: {:.6}", c.p_value).ok();
            writeln!(out, "  95% CI: [{:.6}, {:.6}]", c.ci_low, c.ci_high).ok();
            writeln!(out, "  {}", verdict(c.p_value, config)).ok();
        }
        None => {
            write!(out, "  {}", model.summary_text()).ok();
        }
    }
}

fn write_group(out: &mut String, r: &GroupResult, config: &AnalysisConfig) {
    let rule = "-".repeat(WIDTH);
    writeln!(out, "\n{rule}\n{} GROUP\n{rule}\n", r.group.to_uppercase()).ok();
    writeln!(
        out,
        "Sample size: {} observations, {} subjects, {} blocks\n",
        r.n_rows, r.n_subjects, r.n_blocks
    ).ok();

    writeln!(out, "Mixed-effects model (simple): {SIMPLE_FORMULA}").ok();
    write_coefficient(out, &r.simple, config);
    writeln!(out, "\nMixed-effects model (with day): {DAY_FORMULA}").ok();
    write_coefficient(out, &r.with_day, config);
    if let Some(int) = r.with_day.coefficient(&format!("{X_NAME}:Day_num")) {
        writeln!(
            out,
            "  Trial × Day interaction: coef={:.6}, p={:.6}",
            int.estimate, int.p_value
        ).ok();
    }

    out.push_str("\nMean entropy by trial position:\n");
    writeln!(
        out,
        "  {:<8} {:>10} {:>10} {:>10} {:>6}",
        "position", "mean", "std", "sem", "count"
    ).ok();
    for p in &r.positions {
        writeln!(
            out,
            "  {:<8} {:>10.6} {:>10} {:>10} {:>6}",
            trial_label(p.position),
            p.mean,
            fmt_opt(p.sd, 6),
            fmt_opt(p.sem, 6),
            p.n
        ).ok();
    }
    if let Some(change) = r.change {
        writeln!(
            out,
            "\nMean change T01→T03: {change:.6} ({}%)",
            fmt_opt(r.percent_change, 3)
        ).ok();
    }

    match &r.paired {
        Some(paired) => {
            out.push_str("\nPaired t-test (T01 vs T03):\n");
            writeln!(out, "  n blocks: {}", paired.n_blocks).ok();
            match &paired.test {
                Some(t) => {
                    writeln!(out, "  t-statistic: {:.4}", t.t).ok();
                    writeln!(out, "  p-value: {:.6}", t.p_value).ok();
                }
                None => out.push_str("  t-statistic: n/a (zero variance)\n"),
            }
            writeln!(out, "  Mean difference: {:.6}", paired.mean_diff).ok();
            match &paired.ci {
                Some(ci) => {
                    writeln!(out, "  95% CI (bootstrap): [{:.6}, {:.6}]", ci.low, ci.high).ok();
                }
                None => out.push_str("  95% CI (bootstrap): n/a\n"),
            }
            writeln!(out, "  Cohen's d: {}", fmt_opt(paired.cohens_d, 4)).ok();
            if let Some(p) = paired.p_value() {
                writeln!(out, "  {}", verdict(p, config)).ok();
            }
        }
        None => {
            writeln!(
                out,
                "\nPaired t-test (T01 vs T03): fewer than {} complete blocks",
                config.min_paired_blocks
            ).ok();
        }
    }

    out.push_str("\nSimple linear regression (ignoring clustering):\n");
    match &r.regression {
        Some(fit) => {
            writeln!(out, "  Slope: {:.6}", fit.slope).ok();
            writeln!(out, "  R²: {:.6}", fit.r_squared).ok();
        }
        None => out.push_str("  not computable\n"),
    }
    if let Some(c) = &r.correlation {
        writeln!(out, "  Pearson r: {:.4}, p={:.6}", c.r, c.p_value).ok();
    }
}

fn simple_slope(result: Option<&GroupResult>) -> Option<&Coefficient> {
    result?.simple.coefficient(X_NAME)
}

fn paired_of(result: Option<&GroupResult>) -> Option<&PairedTest> {
    result?.paired.as_ref()
}

fn strength(p: f64, config: &AnalysisConfig) -> &'static str {
    if p < config.significance_level {
        "SIGNIFICANT"
    } else if p < config.marginal_level {
        "MARGINALLY SIGNIFICANT"
    } else {
        "NO significant"
    }
}

pub fn render_text(report: &GroupWithinBlockReport, config: &AnalysisConfig) -> String {
    let mut out = report
        .header
        .banner("SEPARATE WITHIN-BLOCK ANALYSIS BY AGE GROUP", WIDTH);
    writeln!(
        out,
        "Total data: {} rows, {} subjects",
        report.n_rows, report.n_subjects
    ).ok();
    for r in &report.groups {
        write_group(&mut out, r, config);
    }

    out.push_str(&section("COMPARISON: OLD vs YOUNG", WIDTH));
    let old = report.group(GROUP_OLD);
    let young = report.group(GROUP_YOUNG);
    if let (Some(o), Some(y)) = (simple_slope(old), simple_slope(young)) {
        out.push_str("\nWithin-block trial slope (simple model):\n");
        writeln!(out, "  OLD:   {:.6} (p={:.6}) {}", o.estimate, o.p_value, marker(o.p_value)).ok();
        writeln!(out, "  YOUNG: {:.6} (p={:.6}) {}", y.estimate, y.p_value, marker(y.p_value)).ok();
        writeln!(out, "  Difference: {:.6}", o.estimate - y.estimate).ok();
    }
    if let (Some(o), Some(y)) = (paired_of(old), paired_of(young)) {
        out.push_str("\nMean change T01→T03 (paired tests):\n");
        for (label, p) in [("OLD:  ", o), ("YOUNG:", y)] {
            writeln!(
                out,
                "  {label} {:.6} (p={}, d={})",
                p.mean_diff,
                fmt_opt(p.p_value(), 6),
                fmt_opt(p.cohens_d, 4)
            ).ok();
        }
    }

    out.push_str(&section("SUMMARY & INTERPRETATION", WIDTH));
    let pvals = (
        paired_of(old).and_then(PairedTest::p_value).zip(paired_of(old)),
        paired_of(young).and_then(PairedTest::p_value).zip(paired_of(young)),
    );
    match pvals {
        (Some((old_p, o)), Some((young_p, y))) => {
            for (label, p, test) in [("OLD", old_p, o), ("YOUNG", young_p, y)] {
                writeln!(
                    out,
                    "{label} group shows {} within-block entropy increase (p={p:.4}, d={})\n",
                    strength(p, config),
                    fmt_opt(test.cohens_d, 4)
                ).ok();
            }
            if old_p < config.marginal_level && young_p >= config.marginal_level {
                out.push_str("\nCONCLUSION: Older adults show evidence of SHORT-TERM fatigue accumulation\n");
                out.push_str("within blocks (increasing entropy across T01→T02→T03), while younger adults\n");
                out.push_str("do not show this pattern. This suggests age-related differences in the\n");
                out.push_str("rate of fatigue development during consecutive balance tasks.\n");
            } else if old_p >= config.marginal_level && young_p >= config.marginal_level {
                out.push_str("\nCONCLUSION: Neither age group shows significant within-block entropy changes.\n");
                out.push_str("Short-term fatigue (across 3 consecutive trials) does not manifest as\n");
                out.push_str("systematic entropy increases in either older or younger adults.\n");
            } else {
                out.push_str("\nCONCLUSION: Within-block entropy changes are present in the younger group\n");
                out.push_str("or in both groups; see the per-group results above.\n");
            }
        }
        _ => out.push_str("Paired tests are not available for both groups; no conclusion is drawn.\n"),
    }
    out
}

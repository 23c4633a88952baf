//! Trial-level mixed-effects analysis
//!
//! Does entropy change across the nine trials of a day (3 blocks x 3 trials)?
//! Model: `symb ~ trial_number + C(group) + Day_num + trial_number:C(group) +
//! trial_number:Day_num` with a random intercept per subject.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use super::{
    interaction_frame, mean_series, position_distribution, section, trial_number, write_text,
    GroupTrend, KeyFindings, LoadedSnapshot, ModelReport, ReportHeader,
};
use crate::charts::{self, Panel, TrendPanel};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::ObservationSet;
use crate::types::{Observation, GROUP_OLD, GROUP_YOUNG};

pub const CHART: &str = "trial_level_entropy_trend.svg";
pub const RESULTS: &str = "trial_level_analysis_results.txt";
pub const X_NAME: &str = "trial_number";
pub const FORMULA: &str =
    "symb ~ trial_number + C(group) + Day_num + trial_number:C(group) + trial_number:Day_num";

const WIDTH: usize = 70;

#[derive(Debug, Clone, Serialize)]
pub struct TrialLevelReport {
    pub header: ReportHeader,
    pub n_rows: usize,
    pub skipped: usize,
    pub n_subjects: usize,
    pub group_counts: BTreeMap<String, usize>,
    pub day_counts: BTreeMap<String, usize>,
    pub trial_range: Option<(u32, u32)>,
    pub model: ModelReport,
    pub findings: Option<KeyFindings>,
    pub trends: Vec<GroupTrend>,
    pub chart: PathBuf,
    pub results: PathBuf,
}

/// Fit the model and compute per-group trends
pub fn analyze(set: &ObservationSet) -> (ModelReport, Option<KeyFindings>, Vec<GroupTrend>) {
    let all: Vec<&Observation> = set.observations.iter().collect();
    let model = ModelReport::fit(FORMULA, &interaction_frame(&all, X_NAME, trial_number));
    let findings = KeyFindings::from_model(&model, X_NAME);
    let trends = [GROUP_OLD, GROUP_YOUNG]
        .into_iter()
        .map(|g| GroupTrend::of(&set.group(g), g, |o| o.trial_number))
        .collect();
    (model, findings, trends)
}

pub fn run(snapshot: &LoadedSnapshot, config: &AnalysisConfig) -> Result<TrialLevelReport, AnalysisError> {
    let set = &snapshot.observations;
    if set.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "no records with subject, group and Day/Block/Trial".into(),
        ));
    }
    let header = ReportHeader::new("trial_level", &snapshot.path);
    let (model, findings, trends) = analyze(set);

    let trials = set.observations.iter().map(|o| o.trial_number);
    let trial_range = trials.clone().min().zip(trials.max());

    let report = TrialLevelReport {
        header,
        n_rows: set.len(),
        skipped: set.skipped,
        n_subjects: set.subject_count(),
        group_counts: set.group_counts(),
        day_counts: set.day_counts(),
        trial_range,
        model,
        findings,
        trends,
        chart: config.output_path(CHART),
        results: config.output_path(RESULTS),
    };

    charts::render(
        &report.chart,
        "Trial-level entropy trend",
        2,
        &chart_panels(set, &report.trends),
    )?;
    write_text(&report.results, &render_text(&report, config))?;
    Ok(report)
}

fn chart_panels(set: &ObservationSet, trends: &[GroupTrend]) -> Vec<Panel> {
    let by_group = TrendPanel {
        title: "Entropy Trend Across Trial Sequence by Group".into(),
        x_desc: "Trial Number (1-9)".into(),
        y_desc: "Symbolic Entropy".into(),
        x_tick_prefix: None,
        series: trends
            .iter()
            .map(|t| t.series(format!("{} (n={})", t.group.to_uppercase(), t.n_subjects)))
            .collect(),
        trajectories: Vec::new(),
        note: None,
    };

    let days: Vec<String> = set.day_counts().into_keys().collect();
    let mut by_day = Vec::new();
    for day in &days {
        for group in [GROUP_OLD, GROUP_YOUNG] {
            let subset: Vec<&Observation> = set
                .observations
                .iter()
                .filter(|o| o.is_group(group) && &o.day == day)
                .collect();
            by_day.push(mean_series(
                &subset,
                format!("{} {day}", group.to_uppercase()),
                charts::group_color(group),
                |o| o.trial_number,
            ));
        }
    }
    let by_day = TrendPanel {
        title: "Entropy by Trial, Day, and Group".into(),
        x_desc: "Trial Number (1-9)".into(),
        y_desc: "Symbolic Entropy".into(),
        x_tick_prefix: None,
        series: by_day,
        trajectories: Vec::new(),
        note: None,
    };

    let mut panels = vec![Panel::Trend(by_group), Panel::Trend(by_day)];
    for group in [GROUP_OLD, GROUP_YOUNG] {
        panels.push(Panel::Distribution(position_distribution(
            &set.group(group),
            group,
            format!("{} Group: Entropy Distribution by Trial", group.to_uppercase()),
            |o| o.trial_number,
            |n| n.to_string(),
        )));
    }
    panels
}

/// Results file: data summary, model table and interpretation
pub fn render_text(report: &TrialLevelReport, config: &AnalysisConfig) -> String {
    let alpha = config.significance_level;
    let mut out = report
        .header
        .banner("TRIAL-LEVEL MIXED-EFFECTS ANALYSIS RESULTS", WIDTH);

    writeln!(out, "Rows used: {} ({} skipped)", report.n_rows, report.skipped).ok();
    writeln!(out, "Subjects: {}", report.n_subjects).ok();
    writeln!(out, "Groups: {:?}", report.group_counts).ok();
    writeln!(out, "Days: {:?}", report.day_counts).ok();
    if let Some((lo, hi)) = report.trial_range {
        writeln!(out, "Trial numbers range: {lo} to {hi}").ok();
    }
    writeln!(out, "\nModel: {}", report.model.formula).ok();
    out.push_str("Random effects: (1 | subject)\n\n");
    out.push_str(&report.model.summary_text());

    out.push_str(&section("INTERPRETATION:", WIDTH));
    match &report.findings {
        Some(f) => {
            let m = &f.main;
            out.push_str("\n1. Trial number main effect:\n");
            writeln!(out, "   Coefficient: {:.6}, p = {:.4}", m.estimate, m.p_value).ok();
            writeln!(out, "   95% CI: [{:.6}, {:.6}]", m.ci_low, m.ci_high).ok();
            if m.p_value < alpha {
                let direction = if m.estimate > 0.0 { "increases" } else { "decreases" };
                writeln!(out, "   SIGNIFICANT: Entropy {direction} with trial sequence").ok();
            } else {
                out.push_str("   Not significant\n");
            }

            if let (Some(int), Some(young)) = (&f.group_interaction, f.young_slope) {
                out.push_str("\n2. Trial × Group interaction:\n");
                writeln!(out, "   Coefficient: {:.6}, p = {:.4}", int.estimate, int.p_value).ok();
                writeln!(out, "   95% CI: [{:.6}, {:.6}]", int.ci_low, int.ci_high).ok();
                writeln!(out, "   OLD slope: {:.6}", f.old_slope).ok();
                writeln!(out, "   YOUNG slope: {young:.6}").ok();
                if int.p_value < alpha {
                    out.push_str("   SIGNIFICANT: Groups differ in how entropy changes across trials\n");
                } else {
                    out.push_str("   Interaction not significant\n");
                }
            }

            if let Some(day) = &f.day_interaction {
                out.push_str("\n3. Trial × Day interaction:\n");
                writeln!(out, "   Coefficient: {:.6}, p = {:.4}", day.estimate, day.p_value).ok();
                writeln!(out, "   95% CI: [{:.6}, {:.6}]", day.ci_low, day.ci_high).ok();
                if day.p_value < alpha {
                    out.push_str("   SIGNIFICANT: trial effect differs by day\n");
                } else {
                    out.push_str("   Not significant\n");
                }
            }
        }
        None => out.push_str("\nNo model estimates are available.\n"),
    }

    out.push_str(&section("TRIAL TRENDS (mean ± SEM):", WIDTH));
    for trend in &report.trends {
        writeln!(
            out,
            "\n{} (n={} subjects)",
            trend.group.to_uppercase(),
            trend.n_subjects
        ).ok();
        for p in &trend.points {
            let sem = p.sem.map_or_else(|| "n/a".to_string(), |s| format!("{s:.6}"));
            writeln!(out, "   trial {}: {:.6} ± {sem} (n={})", p.position, p.mean, p.n).ok();
        }
        if let Some(fit) = &trend.fit {
            writeln!(out, "   linear fit slope: {:.6}", fit.slope).ok();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures;

    fn set(subjects: usize) -> ObservationSet {
        ObservationSet {
            observations: fixtures::observations(subjects),
            skipped: 2,
        }
    }

    #[test]
    fn test_analyze_fits_model() {
        let (model, findings, trends) = analyze(&set(5));
        let fit = model.fit.as_ref().unwrap();
        assert_eq!(fit.n_groups, 10);
        assert_eq!(fit.n_obs, 10 * 18);
        assert_eq!(fit.coefficients.len(), 6);

        let findings = findings.unwrap();
        assert!(findings.young_slope.is_some());
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].group, "old");
        assert_eq!(trends[0].points.len(), 9);
        assert_eq!(trends[0].n_subjects, 5);
        assert!(trends[0].fit.is_some());
    }

    #[test]
    fn test_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let snapshot = LoadedSnapshot {
            path: config.snapshot_path(),
            records: Vec::new(),
            observations: set(4),
        };
        let report = run(&snapshot, &config).unwrap();
        assert!(report.chart.exists());
        assert_eq!(report.trial_range, Some((1, 9)));

        let text = std::fs::read_to_string(&report.results).unwrap();
        assert!(text.contains("TRIAL-LEVEL MIXED-EFFECTS ANALYSIS RESULTS"));
        assert!(text.contains("Random effects: (1 | subject)"));
        assert!(text.contains("1. Trial number main effect:"));
        assert!(text.contains("2. Trial × Group interaction:"));
        assert!(text.contains("Rows used: 144 (2 skipped)"));
    }

    #[test]
    fn test_run_rejects_empty() {
        let config = AnalysisConfig::default();
        let snapshot = LoadedSnapshot {
            path: config.snapshot_path(),
            records: Vec::new(),
            observations: ObservationSet::default(),
        };
        assert!(matches!(
            run(&snapshot, &config),
            Err(AnalysisError::InsufficientData(_))
        ));
    }
}

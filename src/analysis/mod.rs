//! Statistical analyses over the entropy snapshot
//!
//! Each analysis is an independent pass: it re-reads the snapshot, computes
//! its statistics, writes a chart and (where applicable) a text report into
//! the output directory, and returns a serializable report.

pub mod group_diff;
pub mod group_within_block;
pub mod individual;
mod report;
pub mod trial_level;
pub mod within_block;

pub use report::{section, write_text, ReportHeader};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::charts::{self, Category, DistributionPanel, TrendPoint, TrendSeries};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::{distinct, FeatureDeriver, ObservationSet};
use crate::snapshot::read_snapshot;
use crate::stats::{
    linear_fit, mean, sem, std_dev, Coefficient, LinearFit, MixedFit, MixedModel, ModelFrame,
};
use crate::types::{LogRecord, Observation, Significance, GROUP_YOUNG};

/// Response variable of every model
pub const RESPONSE: &str = "symb";

/// Snapshot records together with their derived observations
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub path: PathBuf,
    pub records: Vec<LogRecord>,
    pub observations: ObservationSet,
}

/// Read the configured snapshot and derive observations
pub fn load_snapshot(config: &AnalysisConfig) -> Result<LoadedSnapshot, AnalysisError> {
    let path = config.snapshot_path();
    let records = read_snapshot(&path)?;
    let observations = FeatureDeriver::derive(&records);
    info!(
        "{} records, {} usable observations, {} skipped",
        records.len(),
        observations.len(),
        observations.skipped
    );
    Ok(LoadedSnapshot {
        path,
        records,
        observations,
    })
}

/// Mean, spread and count of `symb` at one x position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionStats {
    pub position: u32,
    pub n: usize,
    pub mean: f64,
    pub sd: Option<f64>,
    pub sem: Option<f64>,
}

/// `symb` values grouped by a numeric position
pub fn values_by_position(
    observations: &[&Observation],
    key: impl Fn(&Observation) -> u32,
) -> BTreeMap<u32, Vec<f64>> {
    let mut by_position: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for obs in observations {
        by_position.entry(key(obs)).or_default().push(obs.symb);
    }
    by_position
}

/// Per-position summary, ordered by position
pub fn position_stats(
    observations: &[&Observation],
    key: impl Fn(&Observation) -> u32,
) -> Vec<PositionStats> {
    values_by_position(observations, key)
        .into_iter()
        .filter_map(|(position, values)| {
            Some(PositionStats {
                position,
                n: values.len(),
                mean: mean(&values)?,
                sd: std_dev(&values),
                sem: sem(&values),
            })
        })
        .collect()
}

/// Mean ± SEM per position for one group, with a line fitted to the means
#[derive(Debug, Clone, Serialize)]
pub struct GroupTrend {
    pub group: String,
    pub n_subjects: usize,
    pub points: Vec<PositionStats>,
    pub fit: Option<LinearFit>,
}

impl GroupTrend {
    pub fn of(observations: &[&Observation], group: &str, key: impl Fn(&Observation) -> u32) -> Self {
        let points = position_stats(observations, key);
        let xs: Vec<f64> = points.iter().map(|p| p.position as f64).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.mean).collect();
        Self {
            group: group.to_string(),
            n_subjects: distinct(observations.iter().map(|o| o.subject.as_str())),
            fit: linear_fit(&xs, &ys),
            points,
        }
    }

    /// Chart series with SEM bars and the fitted line
    pub fn series(&self, label: String) -> TrendSeries {
        TrendSeries {
            label,
            color: charts::group_color(&self.group),
            points: self
                .points
                .iter()
                .map(|p| TrendPoint {
                    x: p.position as f64,
                    mean: p.mean,
                    sem: p.sem,
                })
                .collect(),
            fit: self.fit,
        }
    }
}

/// Means-only chart series (no error bars, no fit)
pub fn mean_series(
    observations: &[&Observation],
    label: String,
    color: plotters::style::RGBColor,
    key: impl Fn(&Observation) -> u32,
) -> TrendSeries {
    TrendSeries {
        label,
        color,
        points: position_stats(observations, key)
            .into_iter()
            .map(|p| TrendPoint {
                x: p.position as f64,
                mean: p.mean,
                sem: None,
            })
            .collect(),
        fit: None,
    }
}

/// One box per position for a single group
pub fn position_distribution(
    observations: &[&Observation],
    group: &str,
    title: String,
    key: impl Fn(&Observation) -> u32,
    label: impl Fn(u32) -> String,
) -> DistributionPanel {
    DistributionPanel {
        title,
        y_desc: "Symbolic Entropy".into(),
        categories: values_by_position(observations, key)
            .into_iter()
            .map(|(position, values)| Category {
                label: label(position),
                values,
                color: charts::group_color(group),
            })
            .collect(),
        annotations: Vec::new(),
    }
}

/// Block-level pair of trial values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedBlock {
    pub block_id: String,
    pub first: f64,
    pub last: f64,
}

/// Blocks that have both `first` and `last` trial positions.
///
/// Duplicate entries for the same block and position are averaged.
pub fn paired_blocks(observations: &[&Observation], first: u32, last: u32) -> Vec<PairedBlock> {
    let mut cells: BTreeMap<&str, BTreeMap<u32, (f64, usize)>> = BTreeMap::new();
    for obs in observations {
        let cell = cells
            .entry(obs.block_id.as_str())
            .or_default()
            .entry(obs.trial_within_block)
            .or_insert((0.0, 0));
        cell.0 += obs.symb;
        cell.1 += 1;
    }
    cells
        .into_iter()
        .filter_map(|(block_id, positions)| {
            let (s1, n1) = positions.get(&first)?;
            let (s3, n3) = positions.get(&last)?;
            Some(PairedBlock {
                block_id: block_id.to_string(),
                first: s1 / *n1 as f64,
                last: s3 / *n3 as f64,
            })
        })
        .collect()
}

/// One block's trials, ordered by position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockTrajectory {
    pub block_id: String,
    pub group: String,
    pub points: Vec<(f64, f64)>,
}

/// Seeded sample of up to `limit` blocks; only complete blocks are returned
pub fn sample_trajectories(
    observations: &[&Observation],
    limit: usize,
    seed: u64,
) -> Vec<BlockTrajectory> {
    let mut blocks: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        blocks.entry(obs.block_id.as_str()).or_default().push(obs);
    }
    let ids: Vec<&str> = blocks.keys().copied().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let chosen: Vec<&str> = ids.choose_multiple(&mut rng, limit.min(ids.len())).copied().collect();

    chosen
        .into_iter()
        .filter_map(|id| {
            let mut trials = blocks.get(id)?.clone();
            if trials.len() != crate::types::TRIALS_PER_BLOCK as usize {
                return None;
            }
            trials.sort_by_key(|o| o.trial_within_block);
            Some(BlockTrajectory {
                block_id: id.to_string(),
                group: trials[0].group.clone(),
                points: trials
                    .iter()
                    .map(|o| (o.trial_within_block as f64, o.symb))
                    .collect(),
            })
        })
        .collect()
}

/// Sorted distinct group labels of a set of observations
pub fn group_levels(observations: &[&Observation]) -> Vec<String> {
    observations
        .iter()
        .map(|o| o.group.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Treatment-coded indicator name for a non-reference group level
pub fn group_term(level: &str) -> String {
    format!("C(group)[T.{level}]")
}

/// Full interaction design:
/// `symb ~ x + C(group) + Day_num + x:C(group) + x:Day_num`, grouped by subject.
///
/// The alphabetically first group level is the reference.
pub fn interaction_frame(
    observations: &[&Observation],
    x_name: &str,
    x: impl Fn(&Observation) -> f64,
) -> ModelFrame {
    let levels = group_levels(observations);
    let dummies: Vec<&String> = levels.iter().skip(1).collect();

    let mut terms = vec!["Intercept".to_string()];
    terms.extend(dummies.iter().map(|l| group_term(l)));
    terms.push(x_name.to_string());
    terms.push("Day_num".to_string());
    terms.extend(dummies.iter().map(|l| format!("{x_name}:{}", group_term(l))));
    terms.push(format!("{x_name}:Day_num"));

    let mut frame = ModelFrame {
        terms,
        ..Default::default()
    };
    for obs in observations {
        let xv = x(obs);
        let day = obs.day_num as f64;
        let indicators: Vec<f64> = dummies
            .iter()
            .map(|l| if obs.group == **l { 1.0 } else { 0.0 })
            .collect();

        let mut row = vec![1.0];
        row.extend(&indicators);
        row.push(xv);
        row.push(day);
        row.extend(indicators.iter().map(|d| d * xv));
        row.push(xv * day);
        frame.push(obs.subject.clone(), row, obs.symb);
    }
    frame
}

/// Random-intercept model with no group terms: `symb ~ x [+ Day_num + x:Day_num]`
pub fn within_group_frame(
    observations: &[&Observation],
    x_name: &str,
    x: impl Fn(&Observation) -> f64,
    with_day: bool,
) -> ModelFrame {
    let mut terms = vec!["Intercept".to_string(), x_name.to_string()];
    if with_day {
        terms.push("Day_num".to_string());
        terms.push(format!("{x_name}:Day_num"));
    }
    let mut frame = ModelFrame {
        terms,
        ..Default::default()
    };
    for obs in observations {
        let xv = x(obs);
        let mut row = vec![1.0, xv];
        if with_day {
            let day = obs.day_num as f64;
            row.push(day);
            row.push(xv * day);
        }
        frame.push(obs.subject.clone(), row, obs.symb);
    }
    frame
}

/// A model fit, or the reason it could not be fitted
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub formula: String,
    pub fit: Option<MixedFit>,
    pub error: Option<String>,
}

impl ModelReport {
    /// Fit `frame`; failures are recorded rather than propagated
    pub fn fit(formula: &str, frame: &ModelFrame) -> Self {
        match MixedModel::fit(frame, RESPONSE) {
            Ok(fit) => Self {
                formula: formula.to_string(),
                fit: Some(fit),
                error: None,
            },
            Err(e) => {
                warn!("could not fit {formula}: {e}");
                Self {
                    formula: formula.to_string(),
                    fit: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.fit.as_ref()?.coefficient(name)
    }

    /// Model summary table, or the failure message
    pub fn summary_text(&self) -> String {
        match (&self.fit, &self.error) {
            (Some(fit), _) => fit.summary_text(),
            (None, Some(e)) => format!("Model could not be fitted: {e}\n"),
            (None, None) => "Model could not be fitted\n".to_string(),
        }
    }
}

/// Main effect of `x` and its interactions with group and day
#[derive(Debug, Clone, Serialize)]
pub struct KeyFindings {
    pub main: Coefficient,
    pub group_interaction: Option<Coefficient>,
    pub old_slope: f64,
    pub young_slope: Option<f64>,
    pub day_interaction: Option<Coefficient>,
}

impl KeyFindings {
    pub fn from_model(model: &ModelReport, x_name: &str) -> Option<Self> {
        let main = model.coefficient(x_name)?.clone();
        let group_interaction = model
            .coefficient(&format!("{x_name}:{}", group_term(GROUP_YOUNG)))
            .cloned();
        let day_interaction = model.coefficient(&format!("{x_name}:Day_num")).cloned();
        Some(Self {
            old_slope: main.estimate,
            young_slope: group_interaction.as_ref().map(|c| main.estimate + c.estimate),
            main,
            group_interaction,
            day_interaction,
        })
    }
}

/// Numeric x position used for the trial-number models
pub fn trial_number(obs: &Observation) -> f64 {
    obs.trial_number as f64
}

/// Numeric x position used for the within-block models
pub fn trial_within_block(obs: &Observation) -> f64 {
    obs.trial_within_block as f64
}

/// `T01`-style label for a trial position
pub fn trial_label(position: u32) -> String {
    format!("T{position:02}")
}

/// Verdict line for a p-value against the configured thresholds
pub fn verdict(p: f64, config: &AnalysisConfig) -> &'static str {
    if p < config.significance_level {
        "*** SIGNIFICANT ***"
    } else if p < config.marginal_level {
        "* Marginally significant *"
    } else {
        "Not significant"
    }
}

/// Significance marker for a p-value
pub fn marker(p: f64) -> &'static str {
    Significance::from_p(p).marker()
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn obs(block_id: &str, trial: u32, symb: f64) -> Observation {
        Observation {
            subject: "S001".into(),
            group: "old".into(),
            day: "D01".into(),
            block: "B01".into(),
            day_num: 1,
            block_num: 1,
            trial_within_block: trial,
            trial_number: trial,
            block_id: block_id.into(),
            symb,
            perm: 0.5,
        }
    }

    #[test]
    fn test_position_stats() {
        let data = vec![obs("a", 1, 1.0), obs("a", 2, 2.0), obs("b", 1, 3.0)];
        let refs: Vec<&Observation> = data.iter().collect();
        let stats = position_stats(&refs, |o| o.trial_within_block);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].position, 1);
        assert_eq!(stats[0].n, 2);
        assert_eq!(stats[0].mean, 2.0);
        assert_eq!(stats[1].sd, None);
    }

    #[test]
    fn test_paired_blocks_average_duplicates() {
        let data = vec![
            obs("a", 1, 1.0),
            obs("a", 3, 2.0),
            obs("a", 3, 4.0),
            obs("b", 1, 5.0),
            obs("c", 3, 6.0),
        ];
        let refs: Vec<&Observation> = data.iter().collect();
        let pairs = paired_blocks(&refs, 1, 3);
        assert_eq!(
            pairs,
            vec![PairedBlock {
                block_id: "a".into(),
                first: 1.0,
                last: 3.0,
            }]
        );
    }

    #[test]
    fn test_sample_trajectories_complete_only() {
        let data = vec![
            obs("a", 2, 1.2),
            obs("a", 1, 1.0),
            obs("a", 3, 1.4),
            obs("b", 1, 2.0),
        ];
        let refs: Vec<&Observation> = data.iter().collect();
        let sample = sample_trajectories(&refs, 10, 42);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].points, vec![(1.0, 1.0), (2.0, 1.2), (3.0, 1.4)]);

        let again = sample_trajectories(&refs, 10, 42);
        assert_eq!(sample, again);
    }

    #[test]
    fn test_interaction_frame_layout() {
        let data = fixtures::observations(2);
        let refs: Vec<&Observation> = data.iter().collect();
        let frame = interaction_frame(&refs, "trial_number", trial_number);
        assert_eq!(
            frame.terms,
            vec![
                "Intercept",
                "C(group)[T.young]",
                "trial_number",
                "Day_num",
                "trial_number:C(group)[T.young]",
                "trial_number:Day_num",
            ]
        );
        let young = data.iter().position(|o| o.group == "young").unwrap();
        let row = &frame.rows[young];
        let o = &data[young];
        assert_eq!(
            row,
            &vec![
                1.0,
                1.0,
                o.trial_number as f64,
                o.day_num as f64,
                o.trial_number as f64,
                (o.trial_number * o.day_num) as f64,
            ]
        );
        assert_eq!(frame.groups[young], o.subject);
    }

    #[test]
    fn test_model_report_records_failure() {
        let data = vec![obs("a", 1, 1.0), obs("a", 2, 1.1), obs("a", 3, 1.3)];
        let refs: Vec<&Observation> = data.iter().collect();
        let frame = within_group_frame(&refs, "Trial_within_block", trial_within_block, false);
        let report = ModelReport::fit("symb ~ Trial_within_block", &frame);
        assert!(report.fit.is_none());
        assert!(report.summary_text().starts_with("Model could not be fitted"));
    }

    #[test]
    fn test_key_findings_slopes() {
        let data = fixtures::observations(4);
        let refs: Vec<&Observation> = data.iter().collect();
        let frame = interaction_frame(&refs, "Trial_within_block", trial_within_block);
        let model = ModelReport::fit("formula", &frame);
        let findings = KeyFindings::from_model(&model, "Trial_within_block").unwrap();

        // Old drifts +0.02 per trial, young is flat apart from wobble
        let young = findings.young_slope.unwrap();
        assert!(findings.old_slope > young);
        assert!(findings.group_interaction.is_some());
        assert!(findings.day_interaction.is_some());
    }
}

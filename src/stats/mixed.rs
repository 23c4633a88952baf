//! Linear mixed model with a random intercept per group
//!
//! `y = X beta + u_g + e`, with `u_g ~ N(0, s2_u)` and `e ~ N(0, s2)`.
//! Fitted by REML with the residual variance profiled out, leaving a
//! one-dimensional search over the variance ratio `s2_u / s2`.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::hypothesis::normal_two_sided;
use super::linalg::SquareMatrix;
use crate::error::AnalysisError;

const Z_975: f64 = 1.959_963_984_540_054;
const LOG_RATIO_MIN: f64 = -15.0;
const LOG_RATIO_MAX: f64 = 8.0;
const GRID_STEP: f64 = 0.5;
const GOLDEN_TOL: f64 = 1e-8;
const GOLDEN_MAX_ITER: usize = 200;

/// Design matrix, response and grouping for one model
#[derive(Debug, Clone, Default)]
pub struct ModelFrame {
    pub terms: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub response: Vec<f64>,
    pub groups: Vec<String>,
}

impl ModelFrame {
    pub fn new(terms: &[&str]) -> Self {
        Self {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, group: impl Into<String>, row: Vec<f64>, y: f64) {
        self.groups.push(group.into());
        self.rows.push(row);
        self.response.push(y);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fixed-effect estimate with Wald inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z: f64,
    pub p_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Fitted random-intercept model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedFit {
    pub response: String,
    pub coefficients: Vec<Coefficient>,
    pub group_variance: f64,
    pub residual_variance: f64,
    pub n_obs: usize,
    pub n_groups: usize,
    pub min_group_size: usize,
    pub max_group_size: usize,
    pub mean_group_size: f64,
    pub log_likelihood: f64,
    pub converged: bool,
}

impl MixedFit {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    /// Plain-text results table
    pub fn summary_text(&self) -> String {
        let rule = "=".repeat(78);
        let thin = "-".repeat(78);
        let mut out = String::new();
        out.push_str("           Mixed Linear Model Regression Results\n");
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "Model:             {:<20} Dependent Variable: {}\n",
            "MixedLM", self.response
        ));
        out.push_str(&format!(
            "No. Observations:  {:<20} Method:             REML\n",
            self.n_obs
        ));
        out.push_str(&format!(
            "No. Groups:        {:<20} Scale:              {:.4}\n",
            self.n_groups, self.residual_variance
        ));
        out.push_str(&format!(
            "Min. group size:   {:<20} Log-Likelihood:     {:.4}\n",
            self.min_group_size, self.log_likelihood
        ));
        out.push_str(&format!(
            "Max. group size:   {:<20} Converged:          {}\n",
            self.max_group_size,
            if self.converged { "Yes" } else { "No" }
        ));
        out.push_str(&format!("Mean group size:   {:.1}\n", self.mean_group_size));
        out.push_str(&thin);
        out.push('\n');
        out.push_str(&format!(
            "{:<32} {:>8} {:>8} {:>7} {:>6} {:>7} {:>7}\n",
            "", "Coef.", "Std.Err.", "z", "P>|z|", "[0.025", "0.975]"
        ));
        out.push_str(&thin);
        out.push('\n');
        for c in &self.coefficients {
            out.push_str(&format!(
                "{:<32} {:>8.4} {:>8.4} {:>7.3} {:>6.3} {:>7.3} {:>7.3}\n",
                c.name, c.estimate, c.std_error, c.z, c.p_value, c.ci_low, c.ci_high
            ));
        }
        out.push_str(&format!("{:<32} {:>8.4}\n", "Group Var", self.group_variance));
        out.push_str(&rule);
        out.push('\n');
        out
    }
}

/// Per-group cross-products, enough to evaluate the profile at any ratio
struct GroupBlock {
    n: f64,
    xtx: SquareMatrix,
    xt1: Vec<f64>,
    xty: Vec<f64>,
    sum_y: f64,
    yty: f64,
}

/// Profiled REML state at one variance ratio
struct Profile {
    log_likelihood: f64,
    beta: Vec<f64>,
    a_inv: SquareMatrix,
    sigma2: f64,
}

pub struct MixedModel;

impl MixedModel {
    /// Fit `frame` by REML.
    ///
    /// Needs at least two groups and more observations than fixed effects.
    pub fn fit(frame: &ModelFrame, response: &str) -> Result<MixedFit, AnalysisError> {
        let p = frame.terms.len();
        let n_obs = frame.rows.len();
        if p == 0 {
            return Err(AnalysisError::InsufficientData(
                "model has no fixed-effect terms".into(),
            ));
        }
        if frame.response.len() != n_obs || frame.groups.len() != n_obs {
            return Err(AnalysisError::InsufficientData(
                "model frame columns have different lengths".into(),
            ));
        }
        if let Some(bad) = frame.rows.iter().position(|r| r.len() != p) {
            return Err(AnalysisError::InsufficientData(format!(
                "row {bad} has {} values, expected {p}",
                frame.rows[bad].len()
            )));
        }
        if n_obs <= p {
            return Err(AnalysisError::InsufficientData(format!(
                "{n_obs} observations for {p} fixed effects"
            )));
        }

        let blocks = Self::group_blocks(frame, p);
        if blocks.len() < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "{} group(s); a random intercept needs at least 2",
                blocks.len()
            )));
        }

        let dof = (n_obs - p) as f64;
        let eval = |ratio: f64| Self::profile(&blocks, p, dof, ratio);

        // Coarse grid on log ratio, then golden section around the best cell
        let mut best_log = LOG_RATIO_MIN;
        let mut best_ll = f64::NEG_INFINITY;
        let steps = ((LOG_RATIO_MAX - LOG_RATIO_MIN) / GRID_STEP).round() as usize;
        for i in 0..=steps {
            let lr = LOG_RATIO_MIN + i as f64 * GRID_STEP;
            if let Some(prof) = eval(lr.exp()) {
                if prof.log_likelihood > best_ll {
                    best_ll = prof.log_likelihood;
                    best_log = lr;
                }
            }
        }
        if !best_ll.is_finite() {
            return Err(AnalysisError::SingularMatrix(
                "fixed-effects design is rank deficient".into(),
            ));
        }

        let (lr, converged) = golden_section(
            |lr| eval(lr.exp()).map_or(f64::NEG_INFINITY, |p| p.log_likelihood),
            (best_log - GRID_STEP).max(LOG_RATIO_MIN),
            (best_log + GRID_STEP).min(LOG_RATIO_MAX),
        );

        let mut ratio = lr.exp();
        let mut prof = eval(ratio).ok_or_else(|| {
            AnalysisError::SingularMatrix("fixed-effects design is rank deficient".into())
        })?;
        // Boundary: no between-group variance
        if let Some(zero) = eval(0.0) {
            if zero.log_likelihood >= prof.log_likelihood {
                ratio = 0.0;
                prof = zero;
            }
        }

        let coefficients = frame
            .terms
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let estimate = prof.beta[j];
                let std_error = (prof.sigma2 * prof.a_inv.get(j, j)).max(0.0).sqrt();
                let z = if std_error > 0.0 { estimate / std_error } else { f64::NAN };
                Coefficient {
                    name: name.clone(),
                    estimate,
                    std_error,
                    z,
                    p_value: normal_two_sided(z),
                    ci_low: estimate - Z_975 * std_error,
                    ci_high: estimate + Z_975 * std_error,
                }
            })
            .collect();

        let sizes: Vec<usize> = blocks.iter().map(|b| b.n as usize).collect();
        Ok(MixedFit {
            response: response.to_string(),
            coefficients,
            group_variance: ratio * prof.sigma2,
            residual_variance: prof.sigma2,
            n_obs,
            n_groups: blocks.len(),
            min_group_size: sizes.iter().copied().min().unwrap_or(0),
            max_group_size: sizes.iter().copied().max().unwrap_or(0),
            mean_group_size: n_obs as f64 / blocks.len() as f64,
            log_likelihood: prof.log_likelihood,
            converged,
        })
    }

    fn group_blocks(frame: &ModelFrame, p: usize) -> Vec<GroupBlock> {
        let mut by_group: BTreeMap<&str, GroupBlock> = BTreeMap::new();
        for ((row, &y), group) in frame.rows.iter().zip(&frame.response).zip(&frame.groups) {
            let block = by_group.entry(group.as_str()).or_insert_with(|| GroupBlock {
                n: 0.0,
                xtx: SquareMatrix::zeros(p),
                xt1: vec![0.0; p],
                xty: vec![0.0; p],
                sum_y: 0.0,
                yty: 0.0,
            });
            block.n += 1.0;
            block.xtx.add_outer(row, row, 1.0);
            for j in 0..p {
                block.xt1[j] += row[j];
                block.xty[j] += row[j] * y;
            }
            block.sum_y += y;
            block.yty += y * y;
        }
        by_group.into_values().collect()
    }

    fn profile(blocks: &[GroupBlock], p: usize, dof: f64, ratio: f64) -> Option<Profile> {
        let mut a = SquareMatrix::zeros(p);
        let mut b = vec![0.0; p];
        let mut log_det_v = 0.0;
        for blk in blocks {
            // (I + ratio * 11')^-1 = I - c 11'
            let c = ratio / (1.0 + blk.n * ratio);
            for i in 0..p {
                for j in 0..p {
                    a.add_to(i, j, blk.xtx.get(i, j));
                }
                b[i] += blk.xty[i] - c * blk.xt1[i] * blk.sum_y;
            }
            a.add_outer(&blk.xt1, &blk.xt1, -c);
            log_det_v += (1.0 + blk.n * ratio).ln();
        }

        let (a_inv, log_det_a) = a.inverse_with_log_det()?;
        let beta = a_inv.mul_vec(&b);

        let mut q = 0.0;
        for blk in blocks {
            let c = ratio / (1.0 + blk.n * ratio);
            let xtx_beta = blk.xtx.mul_vec(&beta);
            let quad: f64 = beta.iter().zip(&xtx_beta).map(|(x, y)| x * y).sum();
            let cross: f64 = beta.iter().zip(&blk.xty).map(|(x, y)| x * y).sum();
            let fitted_sum: f64 = beta.iter().zip(&blk.xt1).map(|(x, y)| x * y).sum();
            let resid_sum = blk.sum_y - fitted_sum;
            q += blk.yty - 2.0 * cross + quad - c * resid_sum * resid_sum;
        }
        if !(q > 0.0) {
            return None;
        }
        let sigma2 = q / dof;
        let log_likelihood =
            -0.5 * (dof * ((2.0 * PI).ln() + sigma2.ln() + 1.0) + log_det_v + log_det_a);

        Some(Profile {
            log_likelihood,
            beta,
            a_inv,
            sigma2,
        })
    }
}

/// Maximize a unimodal function on `[lo, hi]`
fn golden_section(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> (f64, bool) {
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut x1 = hi - inv_phi * (hi - lo);
    let mut x2 = lo + inv_phi * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    for _ in 0..GOLDEN_MAX_ITER {
        if (hi - lo).abs() < GOLDEN_TOL {
            return ((lo + hi) / 2.0, true);
        }
        if f1 < f2 {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + inv_phi * (hi - lo);
            f2 = f(x2);
        } else {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - inv_phi * (hi - lo);
            f1 = f(x1);
        }
    }
    ((lo + hi) / 2.0, false)
}

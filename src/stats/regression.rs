//! Simple linear regression and correlation

use serde::{Deserialize, Serialize};

use super::descriptive::mean;
use super::hypothesis::t_two_sided;

/// Ordinary least-squares line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Pearson correlation with its two-sided p-value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Centered sums of squares and cross-products
fn moments(x: &[f64], y: &[f64]) -> Option<(f64, f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
        sxy += (a - mx) * (b - my);
    }
    Some((sxx, syy, sxy))
}

/// Least-squares fit of `y` on `x`; `None` if `x` has no spread
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let (sxx, syy, sxy) = moments(x, y)?;
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean(y)? - slope * mean(x)?;
    let r_squared = if syy == 0.0 { 1.0 } else { sxy * sxy / (sxx * syy) };
    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Pearson correlation; `None` if either variable has no spread
pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let (sxx, syy, sxy) = moments(x, y)?;
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let n = x.len();
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let p_value = if n <= 2 {
        1.0
    } else if 1.0 - r.abs() < f64::EPSILON {
        0.0
    } else {
        let df = (n - 2) as f64;
        let t = r * (df / (1.0 - r * r)).sqrt();
        t_two_sided(t, df)
    };
    Some(Correlation { r, p_value, n })
}

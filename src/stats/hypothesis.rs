//! Hypothesis tests and effect sizes
//!
//! - Wilcoxon rank-sum (normal approximation, no tie correction)
//! - Mann-Whitney U (normal approximation with tie and continuity correction)
//! - Paired t-test
//! - Cohen's d (pooled and paired) and percentile bootstrap intervals

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use super::descriptive::{mean, percentile, std_dev, variance};

/// Direction of the alternative hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    TwoSided,
    /// First sample tends to be larger
    Greater,
    /// First sample tends to be smaller
    Less,
}

/// Result of a rank-sum test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankSum {
    pub statistic: f64,
    pub p_value: f64,
}

/// Result of a Mann-Whitney U test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MannWhitney {
    /// U statistic of the first sample
    pub u: f64,
    pub z: f64,
    pub p_value: f64,
    pub alternative: Alternative,
}

/// Result of a t-test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTest {
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
    /// Mean of `a - b`
    pub mean_diff: f64,
    pub n: usize,
}

/// Two-sided confidence interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

/// Standard normal survival function
pub(crate) fn normal_sf(z: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(n) => n.cdf(-z),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of a z statistic
pub(crate) fn normal_two_sided(z: f64) -> f64 {
    (2.0 * normal_sf(z.abs())).min(1.0)
}

/// Two-sided p-value of a t statistic
pub(crate) fn t_two_sided(t: f64, df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.cdf(-t.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Average ranks (1-based) of the pooled sample, ties sharing their mean rank.
///
/// Also returns `sum(t^3 - t)` over tie groups.
fn pooled_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Positions i..j share the average of ranks i+1..=j
        let avg = (i + j + 1) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg;
        }
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }
    (ranks, tie_term)
}

/// Sum of the ranks of `x` within the pooled sample
fn rank_sum_of_first(x: &[f64], y: &[f64]) -> (f64, f64) {
    let pooled: Vec<f64> = x.iter().chain(y.iter()).copied().collect();
    let (ranks, tie_term) = pooled_ranks(&pooled);
    (ranks[..x.len()].iter().sum(), tie_term)
}

/// Wilcoxon rank-sum test, two-sided, large-sample normal approximation.
///
/// `None` if either sample is empty.
pub fn rank_sum(x: &[f64], y: &[f64]) -> Option<RankSum> {
    if x.is_empty() || y.is_empty() {
        return None;
    }
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let (s, _) = rank_sum_of_first(x, y);
    let expected = n1 * (n1 + n2 + 1.0) / 2.0;
    let sd = (n1 * n2 * (n1 + n2 + 1.0) / 12.0).sqrt();
    let statistic = (s - expected) / sd;
    Some(RankSum {
        statistic,
        p_value: normal_two_sided(statistic),
    })
}

/// Mann-Whitney U test with normal approximation.
///
/// `None` if either sample is empty or all values are tied.
pub fn mann_whitney_u(x: &[f64], y: &[f64], alternative: Alternative) -> Option<MannWhitney> {
    if x.is_empty() || y.is_empty() {
        return None;
    }
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let n = n1 + n2;
    let (r1, tie_term) = rank_sum_of_first(x, y);
    let u = r1 - n1 * (n1 + 1.0) / 2.0;
    let mu = n1 * n2 / 2.0;
    let var = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if !(var > 0.0) {
        return None;
    }
    let sd = var.sqrt();

    let (z, p_value) = match alternative {
        Alternative::Greater => {
            let z = (u - mu - 0.5) / sd;
            (z, normal_sf(z))
        }
        Alternative::Less => {
            let z = (u - mu + 0.5) / sd;
            (z, normal_sf(-z))
        }
        Alternative::TwoSided => {
            let z = ((u - mu).abs() - 0.5).max(0.0) / sd;
            (z, (2.0 * normal_sf(z)).min(1.0))
        }
    };

    Some(MannWhitney {
        u,
        z,
        p_value,
        alternative,
    })
}

/// Paired t-test on `a - b`, two-sided.
///
/// `None` with fewer than two pairs, mismatched lengths, or zero variance.
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Option<TTest> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let n = diffs.len();
    let mean_diff = mean(&diffs)?;
    let sd = std_dev(&diffs)?;
    if sd == 0.0 {
        return None;
    }
    let t = mean_diff / (sd / (n as f64).sqrt());
    let df = (n - 1) as f64;
    Some(TTest {
        t,
        df,
        p_value: t_two_sided(t, df),
        mean_diff,
        n,
    })
}

/// Cohen's d using the average of the two sample variances
pub fn cohens_d_pooled(x: &[f64], y: &[f64]) -> Option<f64> {
    let pooled = ((variance(x)? + variance(y)?) / 2.0).sqrt();
    if pooled == 0.0 {
        return None;
    }
    Some((mean(x)? - mean(y)?) / pooled)
}

/// Cohen's d for paired differences: mean / sample SD
pub fn cohens_d_paired(diffs: &[f64]) -> Option<f64> {
    let sd = std_dev(diffs)?;
    if sd == 0.0 {
        return None;
    }
    Some(mean(diffs)? / sd)
}

/// Percentile bootstrap interval for the mean of `values`
pub fn bootstrap_mean_ci(
    values: &[f64],
    iterations: usize,
    seed: u64,
    level: f64,
) -> Option<ConfidenceInterval> {
    if values.is_empty() || iterations == 0 {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let n = values.len();
    let means: Vec<f64> = (0..iterations)
        .map(|_| (0..n).map(|_| values[rng.gen_range(0..n)]).sum::<f64>() / n as f64)
        .collect();

    let tail = (1.0 - level) / 2.0 * 100.0;
    Some(ConfidenceInterval {
        low: percentile(&means, tail)?,
        high: percentile(&means, 100.0 - tail)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooled_ranks_with_ties() {
        let (ranks, tie_term) = pooled_ranks(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
        assert_eq!(tie_term, 6.0);
    }

    #[test]
    fn test_rank_sum_reference() {
        // scipy.stats.ranksums([1, 2, 3], [4, 5, 6])
        let result = rank_sum(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert!((result.statistic - -1.9639610121239315).abs() < 1e-9);
        assert!((result.p_value - 0.049534613435626706).abs() < 1e-6);
    }

    #[test]
    fn test_rank_sum_empty() {
        assert!(rank_sum(&[], &[1.0]).is_none());
    }

    #[test]
    fn test_mann_whitney_greater() {
        let result = mann_whitney_u(&[4.0, 5.0, 6.0], &[1.0, 2.0, 3.0], Alternative::Greater).unwrap();
        assert_eq!(result.u, 9.0);
        assert!((result.z - 4.0 / 5.25f64.sqrt()).abs() < 1e-12);
        assert!((result.p_value - 0.04043).abs() < 2e-4);

        let reversed = mann_whitney_u(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], Alternative::Greater).unwrap();
        assert_eq!(reversed.u, 0.0);
        assert!(reversed.p_value > 0.95);
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        assert!(mann_whitney_u(&[1.0, 1.0], &[1.0], Alternative::TwoSided).is_none());
    }

    #[test]
    fn test_paired_t() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 5.0, 4.0, 7.0];
        let result = paired_t_test(&a, &b).unwrap();
        assert!((result.t - -3.5).abs() < 1e-12);
        assert_eq!(result.df, 4.0);
        assert!((result.mean_diff - -1.4).abs() < 1e-12);
        // scipy.stats.ttest_rel gives p = 0.0248...
        assert!(result.p_value > 0.024 && result.p_value < 0.026);
    }

    #[test]
    fn test_paired_t_degenerate() {
        assert!(paired_t_test(&[1.0], &[2.0]).is_none());
        assert!(paired_t_test(&[1.0, 2.0], &[2.0, 3.0]).is_none());
        assert!(paired_t_test(&[1.0, 2.0], &[2.0]).is_none());
    }

    #[test]
    fn test_cohens_d() {
        let d = cohens_d_pooled(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert!((d - -3.0).abs() < 1e-12);

        let paired = cohens_d_paired(&[1.0, 2.0, 3.0]).unwrap();
        assert!((paired - 2.0).abs() < 1e-12);
        assert!(cohens_d_paired(&[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_bootstrap_is_seeded() {
        let values = [0.1, 0.4, -0.2, 0.3, 0.05, 0.2, -0.1];
        let first = bootstrap_mean_ci(&values, 2000, 42, 0.95).unwrap();
        let second = bootstrap_mean_ci(&values, 2000, 42, 0.95).unwrap();
        assert_eq!(first, second);

        let m = mean(&values).unwrap();
        assert!(first.low <= m && m <= first.high);
        assert!(first.low >= -0.2 && first.high <= 0.4);
    }
}

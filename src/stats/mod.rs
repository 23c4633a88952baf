//! Statistics kernels
//!
//! Small, dependency-light implementations of the tests and models used by the
//! analyses. Distribution functions come from `statrs`.

pub mod descriptive;
pub mod hypothesis;
pub mod linalg;
pub mod mixed;
pub mod regression;

pub use descriptive::{mean, median, percentile, sem, std_dev, variance, Summary};
pub use hypothesis::{
    bootstrap_mean_ci, cohens_d_paired, cohens_d_pooled, mann_whitney_u, paired_t_test, rank_sum,
    Alternative, ConfidenceInterval, MannWhitney, RankSum, TTest,
};
pub use mixed::{Coefficient, MixedFit, MixedModel, ModelFrame};
pub use regression::{linear_fit, pearson, Correlation, LinearFit};

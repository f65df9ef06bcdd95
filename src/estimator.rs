//! Online estimators of mean and variance with weighted observations.
//!
//! Every arm of a bandit owns one estimator. Priors are expressed as
//! pseudo-observations baked into the initial estimator, so a policy's
//! `base_data` is simply an estimator that has already "seen" some data.
//!
//! All estimators support an associative `combine`, which is how imported
//! statistics are merged into live arms.
//!
//! Weights that are not finite and strictly positive are ignored: the
//! estimator is left unchanged.

use std::fmt::Debug;

use crate::error::{BanditError, Result};

/// Summary statistic for one arm.
pub trait VarianceEstimator: Clone + Debug + Send + Sync + 'static {
    /// Include `value` in the estimate with frequency weight `weight`.
    fn accept(&mut self, value: f64, weight: f64);

    /// Estimator equivalent to having observed both sample streams.
    fn combine(&self, other: &Self) -> Self;

    fn mean(&self) -> f64;

    fn nbr_weighted_samples(&self) -> f64;

    /// Sum of squared deviations from the mean (`M2`).
    fn squared_deviations(&self) -> f64;

    /// Population variance, `0.0` when there are no samples.
    fn variance(&self) -> f64 {
        let n = self.nbr_weighted_samples();
        if n > 0.0 {
            self.squared_deviations() / n
        } else {
            0.0
        }
    }

    fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Weighted sum of observed values.
    fn sum(&self) -> f64 {
        self.mean() * self.nbr_weighted_samples()
    }
}

/// Estimator that additionally tracks the running mean of squared values.
///
/// Used by variance-aware UCB policies.
pub trait SquaredEstimator: VarianceEstimator {
    fn mean_of_squares(&self) -> f64;
}

#[inline]
fn valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

/// Weighted mean of two means, `0.0` when both weights are zero.
pub fn combine_mean(m1: f64, m2: f64, n1: f64, n2: f64) -> f64 {
    if n2 == 0.0 {
        return if n1 == 0.0 { 0.0 } else { m1 };
    }
    if n1 == 0.0 {
        return m2;
    }
    (m1 * n1 + m2 * n2) / (n1 + n2)
}

/// Pairwise (Chan et al.) merge of two `M2` sums of squared deviations.
pub fn combine_squared_deviations(
    sd1: f64,
    sd2: f64,
    m1: f64,
    m2: f64,
    n1: f64,
    n2: f64,
) -> f64 {
    let n = n1 + n2;
    if n == 0.0 {
        0.0
    } else {
        let d = m1 - m2;
        sd1 + sd2 + d * d * n1 * n2 / n
    }
}

/// Weighted Welford estimator of mean and variance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunningVariance {
    mean: f64,
    squared_deviations: f64,
    nbr_weighted_samples: f64,
}

impl RunningVariance {
    /// Estimator with the given statistics, typically used to express a prior.
    pub fn new(mean: f64, squared_deviations: f64, nbr_weighted_samples: f64) -> Self {
        Self {
            mean,
            squared_deviations: squared_deviations.max(0.0),
            nbr_weighted_samples: nbr_weighted_samples.max(0.0),
        }
    }

    /// Inverse of `accept`. Removing the last remaining weight resets the estimator.
    pub fn remove(&mut self, value: f64, weight: f64) {
        if !valid_weight(weight) {
            return;
        }
        let n = self.nbr_weighted_samples - weight;
        if n <= 0.0 {
            *self = Self::default();
            return;
        }
        self.nbr_weighted_samples = n;
        let old = self.mean;
        self.mean = old - (value - old) * (weight / n);
        self.squared_deviations = (self.squared_deviations - weight * (value - old) * (value - self.mean)).max(0.0);
    }

    /// Rescale the pseudo-count to `n` while keeping mean and variance.
    pub fn update_sample_size(&mut self, n: f64) {
        if self.nbr_weighted_samples > 0.0 && n >= 0.0 {
            self.squared_deviations *= n / self.nbr_weighted_samples;
            self.nbr_weighted_samples = n;
        }
    }
}

impl VarianceEstimator for RunningVariance {
    fn accept(&mut self, value: f64, weight: f64) {
        if !valid_weight(weight) {
            return;
        }
        self.nbr_weighted_samples += weight;
        let old = self.mean;
        self.mean = old + (value - old) * (weight / self.nbr_weighted_samples);
        self.squared_deviations += weight * (value - old) * (value - self.mean);
    }

    fn combine(&self, other: &Self) -> Self {
        let (n1, n2) = (self.nbr_weighted_samples, other.nbr_weighted_samples);
        Self {
            mean: combine_mean(self.mean, other.mean, n1, n2),
            squared_deviations: combine_squared_deviations(
                self.squared_deviations,
                other.squared_deviations,
                self.mean,
                other.mean,
                n1,
                n2,
            ),
            nbr_weighted_samples: n1 + n2,
        }
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn nbr_weighted_samples(&self) -> f64 {
        self.nbr_weighted_samples
    }

    fn squared_deviations(&self) -> f64 {
        self.squared_deviations
    }
}

/// [`RunningVariance`] plus the running mean of squared values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunningSquaredMeans {
    base: RunningVariance,
    mean_of_squares: f64,
}

impl RunningSquaredMeans {
    pub fn new(
        mean: f64,
        mean_of_squares: f64,
        squared_deviations: f64,
        nbr_weighted_samples: f64,
    ) -> Self {
        Self {
            base: RunningVariance::new(mean, squared_deviations, nbr_weighted_samples),
            mean_of_squares,
        }
    }
}

impl VarianceEstimator for RunningSquaredMeans {
    fn accept(&mut self, value: f64, weight: f64) {
        if !valid_weight(weight) {
            return;
        }
        self.base.accept(value, weight);
        let old = self.mean_of_squares;
        self.mean_of_squares = old + (value * value - old) * (weight / self.base.nbr_weighted_samples);
    }

    fn combine(&self, other: &Self) -> Self {
        Self {
            base: self.base.combine(&other.base),
            mean_of_squares: combine_mean(
                self.mean_of_squares,
                other.mean_of_squares,
                self.base.nbr_weighted_samples,
                other.base.nbr_weighted_samples,
            ),
        }
    }

    fn mean(&self) -> f64 {
        self.base.mean
    }

    fn nbr_weighted_samples(&self) -> f64 {
        self.base.nbr_weighted_samples
    }

    fn squared_deviations(&self) -> f64 {
        self.base.squared_deviations
    }
}

impl SquaredEstimator for RunningSquaredMeans {
    fn mean_of_squares(&self) -> f64 {
        self.mean_of_squares
    }
}

/// Exponentially decaying mean and variance for non-stationary rewards.
///
/// Old observations lose weight geometrically with rate `beta`. The weighted
/// sample count saturates at the effective window `2 / beta - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExponentialDecayVariance {
    beta: f64,
    mean: f64,
    variance: f64,
    nbr_weighted_samples: f64,
}

impl ExponentialDecayVariance {
    /// Create an empty estimator; `beta` must lie strictly inside `(0, 1)`.
    pub fn new(beta: f64) -> Result<Self> {
        if !(beta > 0.0 && beta < 1.0) {
            return Err(BanditError::InvalidParameter(format!(
                "decay beta must be within (0, 1), got {beta}"
            )));
        }
        Ok(Self {
            beta,
            mean: 0.0,
            variance: 0.0,
            nbr_weighted_samples: 0.0,
        })
    }

    /// Decay tuned to an effective moving window of `window` observations.
    pub fn with_window(window: usize) -> Result<Self> {
        Self::new(2.0 / (window as f64 + 1.0))
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn max_size(&self) -> f64 {
        2.0 / self.beta - 1.0
    }
}

impl Default for ExponentialDecayVariance {
    fn default() -> Self {
        Self {
            beta: 0.02,
            mean: 0.0,
            variance: 0.0,
            nbr_weighted_samples: 0.0,
        }
    }
}

impl VarianceEstimator for ExponentialDecayVariance {
    fn accept(&mut self, value: f64, weight: f64) {
        if !valid_weight(weight) {
            return;
        }
        let first = self.nbr_weighted_samples == 0.0;
        self.nbr_weighted_samples = (self.nbr_weighted_samples + weight).min(self.max_size());
        if first {
            self.mean = value;
            return;
        }
        let beta = if weight == 1.0 {
            self.beta
        } else {
            weight * self.beta / (1.0 - self.beta + weight * self.beta)
        };
        let diff = value - self.mean;
        let inc = beta * diff;
        self.mean += inc;
        self.variance = (1.0 - beta) * (self.variance + inc * diff);
    }

    fn combine(&self, other: &Self) -> Self {
        let (n1, n2) = (self.nbr_weighted_samples, other.nbr_weighted_samples);
        let sd = combine_squared_deviations(
            self.variance * n1,
            other.variance * n2,
            self.mean,
            other.mean,
            n1,
            n2,
        );
        let n = n1 + n2;
        Self {
            beta: self.beta,
            mean: combine_mean(self.mean, other.mean, n1, n2),
            variance: if n > 0.0 { sd / n } else { 0.0 },
            nbr_weighted_samples: n.min(self.max_size()),
        }
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn nbr_weighted_samples(&self) -> f64 {
        self.nbr_weighted_samples
    }

    fn squared_deviations(&self) -> f64 {
        self.variance * self.nbr_weighted_samples
    }

    fn variance(&self) -> f64 {
        self.variance
    }
}

//! Upper-confidence-bound policies.
//!
//! Every variant scores an arm as its (signed) mean plus an exploration
//! padding that shrinks with the arm's sample count. Arms with too few samples
//! score `+inf`, so each arm is tried before any is exploited.

use rand::rngs::StdRng;

use crate::estimator::{RunningSquaredMeans, RunningVariance, SquaredEstimator, VarianceEstimator};
use crate::policy::{signed, BanditPolicy, Round, SampleTotal};

/// UCB1: `mean + alpha * sqrt(2 ln(total) / n)`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ucb1<E = RunningVariance> {
    alpha: f64,
    prior: E,
    total: SampleTotal,
}

impl Ucb1<RunningVariance> {
    pub fn new(alpha: f64) -> Self {
        Self::with_prior(alpha, RunningVariance::default())
    }
}

impl Default for Ucb1<RunningVariance> {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl<E: VarianceEstimator> Ucb1<E> {
    pub fn with_prior(alpha: f64, prior: E) -> Self {
        Self {
            alpha,
            prior,
            total: SampleTotal::default(),
        }
    }

    /// Weighted samples across all live arms.
    pub fn total(&self) -> f64 {
        self.total.get()
    }
}

impl<E: VarianceEstimator> BanditPolicy for Ucb1<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn evaluate(&self, data: &E, _round: &Round, maximize: bool, _rng: &mut StdRng) -> f64 {
        let n = data.nbr_weighted_samples();
        if n < 1.0 {
            return f64::INFINITY;
        }
        let padding = (2.0 * self.total.get().ln() / n).sqrt();
        signed(data.mean(), maximize) + self.alpha * padding
    }

    fn update(&mut self, data: &mut E, value: f64, weight: f64) {
        let before = data.nbr_weighted_samples();
        self.accept(data, value, weight);
        self.total.shift(before, data.nbr_weighted_samples());
    }

    fn add_arm(&mut self, data: &E) {
        self.total.add(data);
    }

    fn remove_arm(&mut self, data: &E) {
        self.total.remove(data);
    }
}

/// UCB1-Normal for normally distributed rewards.
///
/// An arm is forced while `n < 8 ln(k)` (or while there is at most one arm).
/// Otherwise the padding is `sqrt(16 q ln(k - 1) / n)` with
/// `q = (n·mean_of_squares - n·mean²) / (n - 1)`, `k` being the live arm count.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ucb1Normal<E = RunningSquaredMeans> {
    alpha: f64,
    prior: E,
    nbr_arms: usize,
}

impl Ucb1Normal<RunningSquaredMeans> {
    pub fn new(alpha: f64) -> Self {
        Self::with_prior(alpha, RunningSquaredMeans::default())
    }
}

impl Default for Ucb1Normal<RunningSquaredMeans> {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl<E: SquaredEstimator> Ucb1Normal<E> {
    pub fn with_prior(alpha: f64, prior: E) -> Self {
        Self {
            alpha,
            prior,
            nbr_arms: 0,
        }
    }

    pub fn nbr_arms(&self) -> usize {
        self.nbr_arms
    }
}

impl<E: SquaredEstimator> BanditPolicy for Ucb1Normal<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn evaluate(&self, data: &E, _round: &Round, maximize: bool, _rng: &mut StdRng) -> f64 {
        let n = data.nbr_weighted_samples();
        let k = self.nbr_arms as f64;
        if self.nbr_arms <= 1 || n < 8.0 * k.ln() || n <= 1.0 {
            return f64::INFINITY;
        }
        let mean = data.mean();
        let q = ((n * data.mean_of_squares() - n * mean * mean) / (n - 1.0)).max(0.0);
        let padding = (16.0 * q * (k - 1.0).ln() / n).sqrt();
        signed(mean, maximize) + self.alpha * padding
    }

    fn add_arm(&mut self, _data: &E) {
        self.nbr_arms += 1;
    }

    fn remove_arm(&mut self, _data: &E) {
        self.nbr_arms = self.nbr_arms.saturating_sub(1);
    }
}

/// UCB1-Tuned: `mean + alpha * sqrt(p · min(1/4, V))`,
/// `p = ln(total) / n`, `V = mean_of_squares - mean² + sqrt(2p)`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ucb1Tuned<E = RunningSquaredMeans> {
    alpha: f64,
    prior: E,
    total: SampleTotal,
}

impl Ucb1Tuned<RunningSquaredMeans> {
    pub fn new(alpha: f64) -> Self {
        Self::with_prior(alpha, RunningSquaredMeans::default())
    }
}

impl Default for Ucb1Tuned<RunningSquaredMeans> {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl<E: SquaredEstimator> Ucb1Tuned<E> {
    pub fn with_prior(alpha: f64, prior: E) -> Self {
        Self {
            alpha,
            prior,
            total: SampleTotal::default(),
        }
    }

    pub fn total(&self) -> f64 {
        self.total.get()
    }
}

impl<E: SquaredEstimator> BanditPolicy for Ucb1Tuned<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn evaluate(&self, data: &E, _round: &Round, maximize: bool, _rng: &mut StdRng) -> f64 {
        let n = data.nbr_weighted_samples();
        if n <= 1.0 {
            return f64::INFINITY;
        }
        let mean = data.mean();
        let p = (self.total.get().ln() / n).max(0.0);
        let v = data.mean_of_squares() - mean * mean + (2.0 * p).sqrt();
        signed(mean, maximize) + self.alpha * (p * v.min(0.25)).max(0.0).sqrt()
    }

    fn update(&mut self, data: &mut E, value: f64, weight: f64) {
        let before = data.nbr_weighted_samples();
        self.accept(data, value, weight);
        self.total.shift(before, data.nbr_weighted_samples());
    }

    fn add_arm(&mut self, data: &E) {
        self.total.add(data);
    }

    fn remove_arm(&mut self, data: &E) {
        self.total.remove(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn ucb1_forces_untried_arms() {
        let mut p = Ucb1::default();
        let mut tried = p.base_data();
        let fresh = p.base_data();
        p.add_arm(&tried);
        p.add_arm(&fresh);
        p.update(&mut tried, 1.0, 1.0);
        let round = Round::default();
        assert_eq!(p.evaluate(&fresh, &round, true, &mut rng()), f64::INFINITY);
        assert_eq!(p.evaluate(&fresh, &round, false, &mut rng()), f64::INFINITY);
        assert!(p.evaluate(&tried, &round, true, &mut rng()).is_finite());
        assert_eq!(p.total(), 1.0);
    }

    #[test]
    fn ucb1_padding_shrinks_with_samples() {
        let mut p = Ucb1::default();
        let mut a = p.base_data();
        let mut b = p.base_data();
        p.add_arm(&a);
        p.add_arm(&b);
        for _ in 0..2 {
            p.update(&mut a, 0.5, 1.0);
        }
        for _ in 0..50 {
            p.update(&mut b, 0.5, 1.0);
        }
        let round = Round::default();
        assert!(p.evaluate(&a, &round, true, &mut rng()) > p.evaluate(&b, &round, true, &mut rng()));
    }

    #[test]
    fn ucb1_total_follows_removed_arms() {
        let mut p = Ucb1::default();
        let a = RunningVariance::new(1.0, 0.0, 4.0);
        p.add_arm(&a);
        assert_eq!(p.total(), 4.0);
        p.remove_arm(&a);
        assert_eq!(p.total(), 0.0);
    }

    #[test]
    fn ucb1_normal_needs_several_arms_and_samples() {
        let mut p = Ucb1Normal::default();
        let mut a = p.base_data();
        p.add_arm(&a);
        for x in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0] {
            p.update(&mut a, x, 1.0);
        }
        let round = Round::default();
        assert_eq!(p.evaluate(&a, &round, true, &mut rng()), f64::INFINITY);

        let b = p.base_data();
        let c = p.base_data();
        p.add_arm(&b);
        p.add_arm(&c);
        assert_eq!(p.nbr_arms(), 3);
        let score = p.evaluate(&a, &round, true, &mut rng());
        assert!(score.is_finite() && score > a.mean());
        assert_eq!(p.evaluate(&b, &round, true, &mut rng()), f64::INFINITY);
    }

    #[test]
    fn ucb1_tuned_caps_variance_term() {
        let mut p = Ucb1Tuned::default();
        let mut a = p.base_data();
        p.add_arm(&a);
        for x in [0.0, 100.0, 0.0, 100.0] {
            p.update(&mut a, x, 1.0);
        }
        let round = Round::default();
        let score = p.evaluate(&a, &round, true, &mut rng());
        let pad = (4.0f64.ln() / 4.0 * 0.25).sqrt();
        assert!((score - (50.0 + pad)).abs() < 1e-9, "score={score}");
        let min_score = p.evaluate(&a, &round, false, &mut rng());
        assert!((min_score - (-50.0 + pad)).abs() < 1e-9);
    }
}

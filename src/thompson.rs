//! Thompson sampling over a pluggable [`Posterior`].
//!
//! Each arm scores one draw from its posterior; the highest draw wins. This
//! balances exploration and exploitation without any tuning parameter.
//!
//! Notes:
//! - Selection is reproducible: all randomness comes from the `StdRng` the
//!   bandit hands to `evaluate`.
//! - When minimizing, the draw is negated.

use rand::rngs::StdRng;

use crate::estimator::RunningVariance;
use crate::policy::{signed, BanditPolicy, Round};
use crate::posterior::{PooledPosterior, PooledVariance, Posterior};

/// Thompson sampling without cross-arm state.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThompsonSampling<P> {
    posterior: P,
    prior: RunningVariance,
}

impl<P: Posterior> ThompsonSampling<P> {
    /// Thompson sampling with the posterior's default prior.
    pub fn new(posterior: P) -> Self {
        let prior = posterior.default_prior();
        Self { posterior, prior }
    }

    /// Thompson sampling with an explicit prior (pseudo-observations).
    pub fn with_prior(posterior: P, prior: RunningVariance) -> Self {
        Self { posterior, prior }
    }

    pub fn posterior(&self) -> &P {
        &self.posterior
    }
}

impl<P: Posterior> BanditPolicy for ThompsonSampling<P> {
    type Estimator = RunningVariance;

    fn base_data(&self) -> RunningVariance {
        self.prior
    }

    fn evaluate(&self, data: &RunningVariance, _round: &Round, maximize: bool, rng: &mut StdRng) -> f64 {
        signed(self.posterior.sample(data, rng), maximize)
    }

    fn accept(&self, data: &mut RunningVariance, value: f64, weight: f64) {
        self.posterior.update(data, value, weight);
    }
}

/// Thompson sampling over a [`PooledPosterior`], which reads a
/// [`PooledVariance`] across arms.
///
/// The pool is kept in sync with the arm set: an update first removes the arm
/// from the pool, folds the observation, then adds it back.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PooledThompsonSampling<P> {
    posterior: P,
    prior: RunningVariance,
    pool: PooledVariance,
}

impl<P: PooledPosterior> PooledThompsonSampling<P> {
    pub fn new(posterior: P) -> Self {
        let prior = posterior.default_prior();
        Self::with_prior(posterior, prior)
    }

    pub fn with_prior(posterior: P, prior: RunningVariance) -> Self {
        Self {
            posterior,
            pool: PooledVariance::new(&prior),
            prior,
        }
    }

    pub fn pool(&self) -> &PooledVariance {
        &self.pool
    }
}

impl<P: PooledPosterior> BanditPolicy for PooledThompsonSampling<P> {
    type Estimator = RunningVariance;

    fn base_data(&self) -> RunningVariance {
        self.prior
    }

    fn evaluate(&self, data: &RunningVariance, _round: &Round, maximize: bool, rng: &mut StdRng) -> f64 {
        signed(self.posterior.sample_pooled(data, &self.pool, rng), maximize)
    }

    fn update(&mut self, data: &mut RunningVariance, value: f64, weight: f64) {
        self.pool.remove_arm(data);
        self.posterior.update(data, value, weight);
        self.pool.add_arm(data);
    }

    fn accept(&self, data: &mut RunningVariance, value: f64, weight: f64) {
        self.posterior.update(data, value, weight);
    }

    fn add_arm(&mut self, data: &RunningVariance) {
        self.pool.add_arm(data);
    }

    fn remove_arm(&mut self, data: &RunningVariance) {
        self.pool.remove_arm(data);
    }
}

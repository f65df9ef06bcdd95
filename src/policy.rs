//! The policy seam between a bandit and its arm statistics.
//!
//! A [`BanditPolicy`] owns no per-arm state: every arm's statistics live in the
//! estimator the bandit stores for it. A policy may however keep aggregates that
//! span arms (total sample count, live arm count, pooled variance). The bandit
//! keeps those aggregates consistent by routing every arm addition, removal
//! and update through the policy.
//!
//! Ranking is always arg-max. When minimizing, policies negate the mean or
//! sampled term of their score so exploration bonuses keep favouring
//! unexplored arms.

use std::fmt::Debug;

use rand::rngs::StdRng;

use crate::estimator::VarianceEstimator;

/// Per-choose state shared by every arm ranked in that call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Round {
    /// Logical step of the owning bandit when the round started.
    pub step: u64,
    /// Exploration coin for epsilon-style policies.
    pub explore: bool,
}

pub trait BanditPolicy: Clone + Debug + Send + Sync + 'static {
    type Estimator: VarianceEstimator;

    /// Fresh per-arm statistics, with any prior already folded in.
    fn base_data(&self) -> Self::Estimator;

    /// Computed once per `choose`, before any arm is evaluated.
    fn begin_round(&self, step: u64, _rng: &mut StdRng) -> Round {
        Round {
            step,
            explore: false,
        }
    }

    /// Ranking score of one arm. Higher is better regardless of `maximize`.
    fn evaluate(
        &self,
        data: &Self::Estimator,
        round: &Round,
        maximize: bool,
        rng: &mut StdRng,
    ) -> f64;

    /// Fold an observation into `data` and update cross-arm aggregates.
    fn update(&mut self, data: &mut Self::Estimator, value: f64, weight: f64) {
        self.accept(data, value, weight);
    }

    /// Called by the bandit once per observed reward; defaults to `update`.
    fn complete_round(&mut self, data: &mut Self::Estimator, value: f64, weight: f64) {
        self.update(data, value, weight);
    }

    /// Fold an observation into `data` only.
    fn accept(&self, data: &mut Self::Estimator, value: f64, weight: f64) {
        data.accept(value, weight);
    }

    fn add_arm(&mut self, _data: &Self::Estimator) {}

    fn remove_arm(&mut self, _data: &Self::Estimator) {}
}

/// `value` when maximizing, `-value` when minimizing.
#[inline]
pub fn signed(value: f64, maximize: bool) -> f64 {
    if maximize {
        value
    } else {
        -value
    }
}

/// Running total of weighted samples across live arms.
///
/// Shared by the policies whose score depends on `ln(total)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct SampleTotal(f64);

impl SampleTotal {
    pub(crate) fn get(&self) -> f64 {
        self.0
    }

    pub(crate) fn add<E: VarianceEstimator>(&mut self, data: &E) {
        self.0 += data.nbr_weighted_samples();
    }

    pub(crate) fn remove<E: VarianceEstimator>(&mut self, data: &E) {
        self.0 = (self.0 - data.nbr_weighted_samples()).max(0.0);
    }

    /// Account for an update by the change in the arm's sample count.
    pub(crate) fn shift(&mut self, before: f64, after: f64) {
        self.0 = (self.0 + after - before).max(0.0);
    }
}

//! Mean-based policies: pure greedy, uniform random and epsilon schedules.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{BanditError, Result};
use crate::estimator::{RunningVariance, VarianceEstimator};
use crate::policy::{signed, BanditPolicy, Round, SampleTotal};

/// Always exploits: scores each arm by its mean.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Greedy<E = RunningVariance> {
    prior: E,
}

impl<E: VarianceEstimator> Greedy<E> {
    pub fn with_prior(prior: E) -> Self {
        Self { prior }
    }
}

impl<E: VarianceEstimator> BanditPolicy for Greedy<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn evaluate(&self, data: &E, _round: &Round, maximize: bool, _rng: &mut StdRng) -> f64 {
        signed(data.mean(), maximize)
    }
}

/// Always explores: every arm scores a uniform random number.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformSelection<E = RunningVariance> {
    prior: E,
}

impl<E: VarianceEstimator> UniformSelection<E> {
    pub fn with_prior(prior: E) -> Self {
        Self { prior }
    }
}

impl<E: VarianceEstimator> BanditPolicy for UniformSelection<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn evaluate(&self, _data: &E, _round: &Round, _maximize: bool, rng: &mut StdRng) -> f64 {
        rng.random()
    }
}

/// Explores with constant probability `epsilon`, otherwise greedy.
///
/// The coin is flipped once per round, so an exploring round scores every arm
/// uniformly at random.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpsilonGreedy<E = RunningVariance> {
    epsilon: f64,
    prior: E,
}

impl EpsilonGreedy<RunningVariance> {
    pub fn new(epsilon: f64) -> Result<Self> {
        Self::with_prior(epsilon, RunningVariance::default())
    }
}

impl<E: VarianceEstimator> EpsilonGreedy<E> {
    /// `epsilon` must be within `[0, 1]`.
    pub fn with_prior(epsilon: f64, prior: E) -> Result<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(BanditError::InvalidParameter(format!(
                "epsilon must be within [0, 1], got {epsilon}"
            )));
        }
        Ok(Self { epsilon, prior })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl<E: VarianceEstimator> BanditPolicy for EpsilonGreedy<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn begin_round(&self, step: u64, rng: &mut StdRng) -> Round {
        Round {
            step,
            explore: rng.random::<f64>() < self.epsilon,
        }
    }

    fn evaluate(&self, data: &E, round: &Round, maximize: bool, rng: &mut StdRng) -> f64 {
        if round.explore {
            rng.random()
        } else {
            signed(data.mean(), maximize)
        }
    }
}

/// Epsilon-greedy with a decaying schedule `min(1, epsilon / total^decay)`,
/// where `total` is the weighted sample count across all arms.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpsilonDecreasing<E = RunningVariance> {
    epsilon: f64,
    decay: f64,
    prior: E,
    total: SampleTotal,
}

impl EpsilonDecreasing<RunningVariance> {
    pub fn new(epsilon: f64, decay: f64) -> Result<Self> {
        Self::with_prior(epsilon, decay, RunningVariance::default())
    }
}

impl Default for EpsilonDecreasing<RunningVariance> {
    fn default() -> Self {
        Self {
            epsilon: 2.0,
            decay: 0.5,
            prior: RunningVariance::default(),
            total: SampleTotal::default(),
        }
    }
}

impl<E: VarianceEstimator> EpsilonDecreasing<E> {
    /// `epsilon` must be positive and `decay` finite.
    pub fn with_prior(epsilon: f64, decay: f64, prior: E) -> Result<Self> {
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(BanditError::InvalidParameter(format!(
                "epsilon must be positive, got {epsilon}"
            )));
        }
        if !decay.is_finite() {
            return Err(BanditError::InvalidParameter(format!(
                "decay must be finite, got {decay}"
            )));
        }
        Ok(Self {
            epsilon,
            decay,
            prior,
            total: SampleTotal::default(),
        })
    }

    /// Exploration probability at the current sample total.
    pub fn current_epsilon(&self) -> f64 {
        (self.epsilon / self.total.get().powf(self.decay)).min(1.0)
    }
}

impl<E: VarianceEstimator> BanditPolicy for EpsilonDecreasing<E> {
    type Estimator = E;

    fn base_data(&self) -> E {
        self.prior.clone()
    }

    fn begin_round(&self, step: u64, rng: &mut StdRng) -> Round {
        Round {
            step,
            explore: rng.random::<f64>() < self.current_epsilon(),
        }
    }

    fn evaluate(&self, data: &E, round: &Round, maximize: bool, rng: &mut StdRng) -> f64 {
        if round.explore {
            rng.random()
        } else {
            signed(data.mean(), maximize)
        }
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
    use crate::estimator::ExponentialDecayVariance;
    use rand::SeedableRng;

    #[test]
    fn epsilon_greedy_validates_range() {
        assert!(EpsilonGreedy::new(-0.1).is_err());
        assert!(EpsilonGreedy::new(1.1).is_err());
        assert!(EpsilonGreedy::new(0.0).is_ok());
        assert!(EpsilonGreedy::new(1.0).is_ok());
        assert!(EpsilonDecreasing::new(0.0, 0.5).is_err());
    }

    #[test]
    fn epsilon_zero_never_explores() {
        let p = EpsilonGreedy::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..100).all(|i| !p.begin_round(i, &mut rng).explore));
        let one = EpsilonGreedy::new(1.0).unwrap();
        assert!((0..100).all(|i| one.begin_round(i, &mut rng).explore));
    }

    #[test]
    fn greedy_prefers_higher_mean_or_lower_when_minimizing() {
        let p = Greedy::<RunningVariance>::default();
        let lo = RunningVariance::new(1.0, 0.0, 1.0);
        let hi = RunningVariance::new(2.0, 0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        let r = Round::default();
        assert!(p.evaluate(&hi, &r, true, &mut rng) > p.evaluate(&lo, &r, true, &mut rng));
        assert!(p.evaluate(&lo, &r, false, &mut rng) > p.evaluate(&hi, &r, false, &mut rng));
    }

    #[test]
    fn epsilon_decreasing_decays_with_samples() {
        let mut p = EpsilonDecreasing::default();
        let mut a = p.base_data();
        p.add_arm(&a);
        assert_eq!(p.current_epsilon(), 1.0);
        for _ in 0..100 {
            p.update(&mut a, 1.0, 1.0);
        }
        assert!((p.current_epsilon() - 0.2).abs() < 1e-12);
        p.remove_arm(&a);
        assert_eq!(p.current_epsilon(), 1.0);
    }

    #[test]
    fn epsilon_greedy_over_decaying_estimator() {
        let prior = ExponentialDecayVariance::with_window(5).unwrap();
        let p = EpsilonGreedy::with_prior(0.0, prior).unwrap();
        let mut old = p.base_data();
        let mut recent = p.base_data();
        for _ in 0..20 {
            p.accept(&mut old, 1.0, 1.0);
            p.accept(&mut recent, 0.0, 1.0);
        }
        for _ in 0..20 {
            p.accept(&mut old, 0.0, 1.0);
            p.accept(&mut recent, 1.0, 1.0);
        }
        let mut rng = StdRng::seed_from_u64(0);
        let r = p.begin_round(0, &mut rng);
        assert!(p.evaluate(&recent, &r, true, &mut rng) > p.evaluate(&old, &r, true, &mut rng));
    }
}

//! Fixed-arity multi-armed bandit.
//!
//! Arms are indexed `0..nbr_arms()`. Each arm owns one estimator created by the
//! policy's `base_data`; the policy sees every arm addition, removal and update
//! so its cross-arm aggregates stay consistent.
//!
//! `choose` takes `&self` so that many threads can select concurrently under a
//! read lock; the logical step and the random sequence advance atomically.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::{check_lengths, BanditError, Result};
use crate::estimator::VarianceEstimator;
use crate::policy::{signed, BanditPolicy};
use crate::random::RandomSequence;
use crate::sample::{DataSample, VoidSample};

/// Construction-time settings shared by every bandit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BanditConfig {
    /// Seed of the bandit's random sequence.
    pub seed: u64,
    /// Whether higher rewards are better.
    pub maximize: bool,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            maximize: true,
        }
    }
}

impl BanditConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }
}

/// Operations shared by every bandit core, used by the parallel wrapper.
///
/// Selection is not part of this trait because fixed-arity and keyed bandits
/// take different arguments.
pub trait Bandit: Send + Sync + 'static {
    /// How an arm is addressed in updates.
    type Arm: Clone + Send + Sync + 'static;
    /// Export/import payload.
    type Data: Clone + Send + Sync + 'static;

    fn update(&mut self, arm: Self::Arm, result: f64, weight: f64) -> Result<()>;

    /// Apply parallel arrays of updates; `weights` default to 1.0.
    fn update_all(&mut self, arms: &[Self::Arm], results: &[f64], weights: Option<&[f64]>) -> Result<()>;

    /// Independent copy of every arm's statistics.
    fn export_data(&self) -> Self::Data;

    /// Bring in statistics produced by [`export_data`](Self::export_data).
    ///
    /// Without `restructure`, each imported estimator is merged into the live
    /// one with `combine`, as if both sample streams had been observed here.
    /// The merge is additive, not idempotent: importing a bandit's own export
    /// back into it counts every sample twice. With `restructure`, the live
    /// arm set is replaced by the imported one.
    fn import_data(&mut self, data: Self::Data, restructure: bool) -> Result<()>;

    /// Copy of the reward telemetry collector.
    fn rewards(&self) -> Box<dyn DataSample>;

    fn maximize(&self) -> bool;
}

/// Index of the highest score; ties go to the lowest index, NaN never wins.
pub(crate) fn argmax(scores: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.into_iter().enumerate() {
        let s = if s.is_nan() { f64::NEG_INFINITY } else { s };
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

/// Bandit over `nbr_arms` indexed arms.
#[derive(Debug)]
pub struct MultiArmedBandit<P: BanditPolicy> {
    policy: P,
    data: Vec<P::Estimator>,
    maximize: bool,
    seed: u64,
    step: AtomicU64,
    random: RandomSequence,
    rewards: Box<dyn DataSample>,
}

impl<P: BanditPolicy> MultiArmedBandit<P> {
    pub fn new(nbr_arms: usize, policy: P, config: BanditConfig) -> Result<Self> {
        if nbr_arms == 0 {
            return Err(BanditError::NoArms);
        }
        let mut policy = policy;
        let data = (0..nbr_arms)
            .map(|_| {
                let d = policy.base_data();
                policy.add_arm(&d);
                d
            })
            .collect();
        Ok(Self {
            policy,
            data,
            maximize: config.maximize,
            seed: config.seed,
            step: AtomicU64::new(0),
            random: RandomSequence::new(config.seed),
            rewards: Box::new(VoidSample),
        })
    }

    /// Replace the reward telemetry collector.
    pub fn with_rewards(mut self, rewards: Box<dyn DataSample>) -> Self {
        self.rewards = rewards;
        self
    }

    pub fn nbr_arms(&self) -> usize {
        self.data.len()
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of `choose` calls so far.
    pub fn step(&self) -> u64 {
        self.step.load(Ordering::Relaxed)
    }

    /// Statistics of one arm.
    pub fn arm(&self, arm: usize) -> Option<&P::Estimator> {
        self.data.get(arm)
    }

    /// Select the arm to play next.
    pub fn choose(&self) -> usize {
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let mut rng = self.random.next();
        let round = self.policy.begin_round(step, &mut rng);
        argmax(
            self.data
                .iter()
                .map(|d| self.policy.evaluate(d, &round, self.maximize, &mut rng)),
        )
        .unwrap_or(0)
    }

    /// Arm with the best mean, without advancing the step or the random sequence.
    pub fn optimal(&self) -> usize {
        argmax(self.data.iter().map(|d| signed(d.mean(), self.maximize))).unwrap_or(0)
    }

    /// Copy of this bandit reseeded with `seed`, with independent telemetry.
    pub fn reseeded(&self, seed: u64) -> Self {
        let mut copy = self.clone();
        copy.seed = seed;
        copy.random = RandomSequence::new(seed);
        copy
    }

    fn check_arm(&self, arm: usize) -> Result<()> {
        if arm >= self.data.len() {
            return Err(BanditError::ArmOutOfRange {
                arm,
                arms: self.data.len(),
            });
        }
        Ok(())
    }
}

impl<P: BanditPolicy> Clone for MultiArmedBandit<P> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            data: self.data.clone(),
            maximize: self.maximize,
            seed: self.seed,
            step: AtomicU64::new(self.step()),
            random: self.random.clone(),
            rewards: self.rewards.copy(),
        }
    }
}

impl<P: BanditPolicy> Bandit for MultiArmedBandit<P> {
    type Arm = usize;
    type Data = Vec<P::Estimator>;

    fn update(&mut self, arm: usize, result: f64, weight: f64) -> Result<()> {
        self.check_arm(arm)?;
        self.rewards.accept(result, weight);
        self.policy.complete_round(&mut self.data[arm], result, weight);
        Ok(())
    }

    fn update_all(&mut self, arms: &[usize], results: &[f64], weights: Option<&[f64]>) -> Result<()> {
        check_lengths(arms.len(), results.len(), weights.map(<[f64]>::len))?;
        for &arm in arms {
            self.check_arm(arm)?;
        }
        for (i, (&arm, &result)) in arms.iter().zip(results).enumerate() {
            let weight = weights.map_or(1.0, |w| w[i]);
            self.rewards.accept(result, weight);
            self.policy.complete_round(&mut self.data[arm], result, weight);
        }
        Ok(())
    }

    fn export_data(&self) -> Vec<P::Estimator> {
        self.data.clone()
    }

    fn import_data(&mut self, data: Vec<P::Estimator>, restructure: bool) -> Result<()> {
        if restructure {
            if data.is_empty() {
                return Err(BanditError::NoArms);
            }
            debug!(from = self.data.len(), to = data.len(), "restructuring arms");
            for d in &self.data {
                self.policy.remove_arm(d);
            }
            for d in &data {
                self.policy.add_arm(d);
            }
            self.data = data;
            return Ok(());
        }
        if data.len() != self.data.len() {
            return Err(BanditError::ImportLength {
                expected: self.data.len(),
                actual: data.len(),
            });
        }
        debug!(arms = data.len(), "merging imported arm data");
        for (own, imported) in self.data.iter_mut().zip(&data) {
            self.policy.remove_arm(own);
            *own = own.combine(imported);
            self.policy.add_arm(own);
        }
        Ok(())
    }

    fn rewards(&self) -> Box<dyn DataSample> {
        self.rewards.copy()
    }

    fn maximize(&self) -> bool {
        self.maximize
    }
}

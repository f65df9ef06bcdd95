//! Bandit over arbitrary candidate objects ("instances").
//!
//! Arms are keyed by any hashable [`Instance`]. Selection can be restricted by
//! assumption literals: only arms that satisfy every literal are ranked. When
//! no stored arm qualifies, a [`CandidateSource`] (typically a constraint
//! solver) can be asked to synthesize a new one.
//!
//! Iteration order is insertion order, which is also the tie-break order.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::bandit::{argmax, Bandit, BanditConfig};
use crate::error::{check_lengths, BanditError, CandidateError, Result};
use crate::estimator::VarianceEstimator;
use crate::policy::{signed, BanditPolicy};
use crate::random::RandomSequence;
use crate::sample::{DataSample, VoidSample};

/// A DIMACS-style literal: `+v` asserts variable `v` (1-based) true, `-v` false.
pub type Literal = i32;

/// A candidate arm that can be checked against assumption literals.
pub trait Instance: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Whether every literal holds. An empty slice is always satisfied.
    fn satisfies(&self, assumptions: &[Literal]) -> bool;
}

/// Produces new candidate arms that satisfy a set of assumptions.
pub trait CandidateSource<K>: Debug + Send + Sync {
    fn generate(&self, assumptions: &[Literal], rng: &mut StdRng) -> std::result::Result<K, CandidateError>;
}

/// Exported per-arm statistics of a keyed bandit, in insertion order.
pub type KeyedData<K, E> = Vec<(K, E)>;

/// Plain boolean assignment, variable `i` stored at index `i - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Labeling {
    values: Vec<bool>,
}

impl Labeling {
    pub fn new(values: Vec<bool>) -> Self {
        Self { values }
    }

    /// Labeling of `n` variables taken from the low bits of `bits`.
    pub fn from_bits(n: usize, bits: u64) -> Self {
        Self {
            values: (0..n).map(|i| i < 64 && (bits >> i) & 1 == 1).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a 0-based variable.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.values.get(index).copied()
    }

    /// Literal describing the current value of 0-based variable `index`.
    pub fn literal(&self, index: usize) -> Option<Literal> {
        let v = Literal::try_from(index + 1).ok()?;
        self.get(index).map(|b| if b { v } else { -v })
    }

    /// Every variable as a literal, in variable order.
    pub fn literals(&self) -> Vec<Literal> {
        (0..self.values.len()).filter_map(|i| self.literal(i)).collect()
    }
}

impl Instance for Labeling {
    fn satisfies(&self, assumptions: &[Literal]) -> bool {
        assumptions.iter().all(|&lit| {
            if lit == 0 {
                return false;
            }
            let index = lit.unsigned_abs() as usize - 1;
            self.get(index) == Some(lit > 0)
        })
    }
}

/// Bandit whose arms are instances of `K`.
#[derive(Debug)]
pub struct KeyedBandit<K: Instance, P: BanditPolicy> {
    policy: P,
    arms: Vec<(K, P::Estimator)>,
    index: HashMap<K, usize>,
    maximize: bool,
    seed: u64,
    step: AtomicU64,
    random: RandomSequence,
    rewards: Box<dyn DataSample>,
    candidates: Option<Arc<dyn CandidateSource<K>>>,
}

impl<K: Instance, P: BanditPolicy> KeyedBandit<K, P> {
    /// Create a bandit over `instances`. Duplicates are stored once.
    pub fn new(instances: impl IntoIterator<Item = K>, policy: P, config: BanditConfig) -> Self {
        let mut bandit = Self {
            policy,
            arms: Vec::new(),
            index: HashMap::new(),
            maximize: config.maximize,
            seed: config.seed,
            step: AtomicU64::new(0),
            random: RandomSequence::new(config.seed),
            rewards: Box::new(VoidSample),
            candidates: None,
        };
        for k in instances {
            bandit.add_arm(k);
        }
        bandit
    }

    pub fn with_rewards(mut self, rewards: Box<dyn DataSample>) -> Self {
        self.rewards = rewards;
        self
    }

    /// Source used by [`choose_or_generate`](Self::choose_or_generate).
    pub fn with_candidates(mut self, source: Arc<dyn CandidateSource<K>>) -> Self {
        self.candidates = Some(source);
        self
    }

    pub fn nbr_arms(&self) -> usize {
        self.arms.len()
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn step(&self) -> u64 {
        self.step.load(Ordering::Relaxed)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&P::Estimator> {
        self.index.get(key).map(|&i| &self.arms[i].1)
    }

    /// Stored instances in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = &K> {
        self.arms.iter().map(|(k, _)| k)
    }

    /// Select among arms satisfying `assumptions`.
    ///
    /// Fails with [`BanditError::NoArms`] when the bandit is empty and with
    /// [`BanditError::Unsatisfiable`] when no arm satisfies the assumptions.
    /// Both the step and the random sequence advance either way.
    pub fn choose(&self, assumptions: &[Literal]) -> Result<K> {
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let mut rng = self.random.next();
        if self.arms.is_empty() {
            return Err(BanditError::NoArms);
        }
        let round = self.policy.begin_round(step, &mut rng);
        let candidates: Vec<&(K, P::Estimator)> =
            self.arms.iter().filter(|(k, _)| k.satisfies(assumptions)).collect();
        let best = argmax(
            candidates
                .iter()
                .map(|(_, d)| self.policy.evaluate(d, &round, self.maximize, &mut rng)),
        );
        match best {
            Some(i) => Ok(candidates[i].0.clone()),
            None => Err(unsatisfiable(assumptions)),
        }
    }

    /// Like [`choose`](Self::choose), but synthesizes a new arm from the
    /// candidate source when no stored arm satisfies the assumptions.
    pub fn choose_or_generate(&mut self, assumptions: &[Literal]) -> Result<K> {
        match self.choose(assumptions) {
            Err(BanditError::NoArms | BanditError::Unsatisfiable(_)) if self.candidates.is_some() => {
                self.generate(assumptions)
            }
            other => other,
        }
    }

    fn generate(&mut self, assumptions: &[Literal]) -> Result<K> {
        let Some(source) = self.candidates.clone() else {
            return Err(unsatisfiable(assumptions));
        };
        let mut rng = self.random.next();
        match source.generate(assumptions, &mut rng) {
            Ok(k) => {
                debug!(instance = ?k, "generated candidate arm");
                self.add_arm(k.clone());
                Ok(k)
            }
            Err(e) => {
                warn!(error = %e, ?assumptions, "candidate generation failed");
                Err(e.into())
            }
        }
    }

    /// Best mean among satisfying arms; does not advance the step.
    pub fn optimal(&self, assumptions: &[Literal]) -> Result<K> {
        if self.arms.is_empty() {
            return Err(BanditError::NoArms);
        }
        let candidates: Vec<&(K, P::Estimator)> =
            self.arms.iter().filter(|(k, _)| k.satisfies(assumptions)).collect();
        argmax(candidates.iter().map(|(_, d)| signed(d.mean(), self.maximize)))
            .map(|i| candidates[i].0.clone())
            .ok_or_else(|| unsatisfiable(assumptions))
    }

    /// Add an arm with a fresh prior. Returns `false` if it already exists.
    pub fn add_arm(&mut self, key: K) -> bool {
        let data = self.policy.base_data();
        self.insert(key, data)
    }

    /// Remove an arm, returning its statistics.
    pub fn remove_arm(&mut self, key: &K) -> Option<P::Estimator> {
        let i = self.index.remove(key)?;
        let (_, data) = self.arms.remove(i);
        self.policy.remove_arm(&data);
        for (j, (k, _)) in self.arms.iter().enumerate().skip(i) {
            if let Some(slot) = self.index.get_mut(k) {
                *slot = j;
            }
        }
        Some(data)
    }

    /// Copy of this bandit reseeded with `seed`, with independent telemetry.
    pub fn reseeded(&self, seed: u64) -> Self {
        let mut copy = self.clone();
        copy.seed = seed;
        copy.random = RandomSequence::new(seed);
        copy
    }

    fn insert(&mut self, key: K, data: P::Estimator) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.policy.add_arm(&data);
        self.index.insert(key.clone(), self.arms.len());
        self.arms.push((key, data));
        true
    }

    fn slot(&mut self, key: K) -> usize {
        match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.add_arm(key);
                self.arms.len() - 1
            }
        }
    }

    fn apply(&mut self, key: K, result: f64, weight: f64) {
        let i = self.slot(key);
        self.rewards.accept(result, weight);
        self.policy.complete_round(&mut self.arms[i].1, result, weight);
    }
}

fn unsatisfiable(assumptions: &[Literal]) -> BanditError {
    BanditError::Unsatisfiable(format!("no arm matches assumptions {assumptions:?}"))
}

impl<K: Instance, P: BanditPolicy> Clone for KeyedBandit<K, P> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            arms: self.arms.clone(),
            index: self.index.clone(),
            maximize: self.maximize,
            seed: self.seed,
            step: AtomicU64::new(self.step()),
            random: self.random.clone(),
            rewards: self.rewards.copy(),
            candidates: self.candidates.clone(),
        }
    }
}

impl<K: Instance, P: BanditPolicy> Bandit for KeyedBandit<K, P> {
    type Arm = K;
    type Data = KeyedData<K, P::Estimator>;

    /// Unknown keys are added with a fresh prior before the update is applied.
    fn update(&mut self, arm: K, result: f64, weight: f64) -> Result<()> {
        self.apply(arm, result, weight);
        Ok(())
    }

    fn update_all(&mut self, arms: &[K], results: &[f64], weights: Option<&[f64]>) -> Result<()> {
        check_lengths(arms.len(), results.len(), weights.map(<[f64]>::len))?;
        for (i, (arm, &result)) in arms.iter().zip(results).enumerate() {
            let weight = weights.map_or(1.0, |w| w[i]);
            self.apply(arm.clone(), result, weight);
        }
        Ok(())
    }

    fn export_data(&self) -> Self::Data {
        self.arms.clone()
    }

    /// Merge imported statistics into matching arms, adding unknown ones. With
    /// `restructure` the arm set is replaced by the imported one.
    fn import_data(&mut self, data: Self::Data, restructure: bool) -> Result<()> {
        if restructure {
            debug!(from = self.arms.len(), to = data.len(), "restructuring keyed arms");
            for (_, d) in &self.arms {
                self.policy.remove_arm(d);
            }
            self.arms.clear();
            self.index.clear();
        }
        for (key, imported) in data {
            match self.index.get(&key) {
                Some(&i) => {
                    let own = &mut self.arms[i].1;
                    self.policy.remove_arm(own);
                    *own = own.combine(&imported);
                    self.policy.add_arm(own);
                }
                None => {
                    self.insert(key, imported);
                }
            }
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

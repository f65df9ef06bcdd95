//! `combo-bandit`: seedable multi-armed bandits with a batched, replicated
//! concurrent update pipeline.
//!
//! Designed for online decision problems: you repeatedly pick one option
//! (an *arm*) among alternatives, observe a numeric reward afterwards, and want
//! the next pick to be better. Arms are either a fixed number of indices
//! ([`MultiArmedBandit`]) or arbitrary hashable candidates ([`KeyedBandit`]),
//! optionally produced on demand by an external constraint solver.
//!
//! **Goals:**
//! - **Reproducible**: every choice draws from a seeded [`RandomSequence`];
//!   same seed and same update stream give the same choices.
//! - **No lost updates**: every update reaches every replica exactly once.
//! - **Bounded contention**: selection never waits on a busy replica, and
//!   updates are applied in size-bounded batches.
//!
//! **Statistics** ([`estimator`] module):
//! - [`RunningVariance`]: weighted Welford mean/variance with exact merge.
//! - [`RunningSquaredMeans`]: adds the running mean of squares.
//! - [`ExponentialDecayVariance`]: exponentially-weighted, for drifting rewards.
//!
//! **Policies** (all implement [`BanditPolicy`]):
//! - [`ThompsonSampling`] over a [`Posterior`] (Normal, Binomial, Poisson,
//!   Geometric, LogNormal, Exponential, GammaScale).
//! - [`PooledThompsonSampling`] over a [`PooledPosterior`] (HierarchicalNormal),
//!   which also reads the cross-arm [`PooledVariance`].
//! - [`Ucb1`], [`Ucb1Normal`], [`Ucb1Tuned`].
//! - [`Greedy`], [`UniformSelection`], [`EpsilonGreedy`], [`EpsilonDecreasing`].
//!
//! **Concurrency:**
//! - [`ParallelBandit`]: N replicas behind `parking_lot` read/write locks,
//!   fed through a [`Sink`] in one of three [`ParallelMode`]s.
//! - [`Updater`]: background thread applying queued updates.
//!
//! **Non-goals:**
//! - No storage engine: [`Bandit::export_data`] / [`Bandit::import_data`]
//!   define the data contract (serde-serializable with the `serde` feature).
//! - No constraint solving: candidates come from a [`CandidateSource`].
//! - Single process only.
//!
//! # Example
//!
//! ```
//! use combo_bandit::{Bandit, BanditConfig, MultiArmedBandit, Ucb1Tuned};
//!
//! let mut bandit = MultiArmedBandit::new(3, Ucb1Tuned::default(), BanditConfig::default()).unwrap();
//! for round in 0..30 {
//!     let arm = bandit.choose();
//!     let reward = if arm == 2 { 1.0 } else { (round % 2) as f64 * 0.2 };
//!     bandit.update(arm, reward, 1.0).unwrap();
//! }
//! assert_eq!(bandit.optimal(), 2);
//! ```
//!
//! # Concurrent use
//!
//! ```
//! use std::sync::Arc;
//! use combo_bandit::{BanditConfig, ParallelBandit, ParallelConfig, ParallelMode, ThompsonSampling,
//!     NormalPosterior, Updater};
//!
//! let config = ParallelConfig::default().with_mode(ParallelMode::NonBlocking).with_copies(4);
//! let bandit = Arc::new(
//!     ParallelBandit::with_arms(5, ThompsonSampling::new(NormalPosterior), BanditConfig::default(), config)
//!         .unwrap(),
//! );
//! let updater = Updater::spawn(Arc::clone(&bandit));
//! let arm = bandit.choose();
//! bandit.update(arm, 1.5, 1.0);
//! assert_eq!(updater.stop(), 1);
//! ```

#![forbid(unsafe_code)]

mod error;
pub use error::*;

pub mod estimator;
pub use estimator::{ExponentialDecayVariance, RunningSquaredMeans, RunningVariance, SquaredEstimator, VarianceEstimator};

mod random;
pub use random::*;

mod sample;
pub use sample::*;

mod policy;
pub use policy::{signed, BanditPolicy, Round};

mod posterior;
pub use posterior::*;

mod thompson;
pub use thompson::*;

mod ucb;
pub use ucb::*;

mod greedy;
pub use greedy::*;

mod bandit;
pub use bandit::*;

mod keyed;
pub use keyed::*;

mod event;
pub use event::*;

mod sink;
pub use sink::*;

mod batch;
pub use batch::*;

mod parallel;
pub use parallel::*;

mod updater;
pub use updater::*;

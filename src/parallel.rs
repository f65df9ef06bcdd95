//! Replicated bandit for concurrent use.
//!
//! A [`ParallelBandit`] holds several copies of one bandit core, each behind its
//! own read/write lock. Selection reads whichever replica is free; updates go
//! into a sink and are later applied, batch by batch, to every replica by
//! [`ParallelBandit::process_updates`] (usually driven by an
//! [`Updater`](crate::Updater) thread).
//!
//! Replicas of a [`MultiArmedBandit`] receive the same update stream and stay
//! statistically identical. Replicas of a [`KeyedBandit`] may synthesize
//! different arms when candidate generation is enabled.

use std::ops::RangeInclusive;
use std::thread;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use crate::bandit::{Bandit, BanditConfig, MultiArmedBandit};
use crate::batch::{collect_all, BatchAssembler};
use crate::error::{check_lengths, BanditError, Result};
use crate::event::{Batch, UpdateEvent};
use crate::keyed::{Instance, KeyedBandit, Literal};
use crate::policy::BanditPolicy;
use crate::random::{permutation, RandomSequence};
use crate::sample::DataSample;
use crate::sink::{BoundedSink, LockingSink, NonBlockingSink, Sink};

/// How updates travel from producers to replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParallelMode {
    /// Lock-free queues; the updater polls and never blocks.
    NonBlocking,
    /// Mutex-guarded queues; the updater blocks until `lower` updates arrive.
    #[default]
    BlockingSupported,
    /// A single queue bounded at `upper`; producers block while it is full.
    BoundedQueue,
}

/// Settings for [`ParallelBandit`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParallelConfig {
    /// Number of replicas.
    pub copies: usize,
    pub mode: ParallelMode,
    /// Inclusive range of updates per applied batch.
    pub batch_size: RangeInclusive<usize>,
    /// Take a replica's write lock for keyed selections carrying assumptions,
    /// allowing new arms to be generated.
    pub assumptions_lock: bool,
    /// Seed of the replica-selection sequence.
    pub seed: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            copies: 2,
            mode: ParallelMode::default(),
            batch_size: 1..=50,
            assumptions_lock: false,
            seed: 0,
        }
    }
}

impl ParallelConfig {
    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_mode(mut self, mode: ParallelMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_batch_size(mut self, batch_size: RangeInclusive<usize>) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_assumptions_lock(mut self, assumptions_lock: bool) -> Self {
        self.assumptions_lock = assumptions_lock;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

type EventSink<A> = Box<dyn Sink<UpdateEvent<A>>>;
type BatchSink<A> = Box<dyn Sink<Batch<A>>>;

pub struct ParallelBandit<B: Bandit> {
    replicas: Vec<RwLock<B>>,
    input: EventSink<B::Arm>,
    // `None` in bounded mode: drained events are applied directly.
    batches: Option<BatchSink<B::Arm>>,
    assembler: BatchAssembler,
    mode: ParallelMode,
    assumptions_lock: bool,
    random: RandomSequence,
}

impl<B: Bandit> std::fmt::Debug for ParallelBandit<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelBandit")
            .field("replicas", &self.replicas.len())
            .field("mode", &self.mode)
            .field("assembler", &self.assembler)
            .field("pending", &self.pending())
            .finish()
    }
}

impl<B: Bandit> ParallelBandit<B> {
    /// Build `config.copies` replicas with `factory(index)`.
    pub fn new(config: ParallelConfig, mut factory: impl FnMut(usize) -> Result<B>) -> Result<Self> {
        if config.copies == 0 {
            return Err(BanditError::NoReplicas);
        }
        let assembler = BatchAssembler::new(config.batch_size.clone())?;
        let replicas = (0..config.copies)
            .map(|i| factory(i).map(RwLock::new))
            .collect::<Result<Vec<_>>>()?;
        let input: EventSink<B::Arm>;
        let batches: Option<BatchSink<B::Arm>>;
        match config.mode {
            ParallelMode::NonBlocking => {
                input = Box::new(NonBlockingSink::new());
                batches = Some(Box::new(NonBlockingSink::new()) as BatchSink<B::Arm>);
            }
            ParallelMode::BlockingSupported => {
                input = Box::new(LockingSink::new());
                batches = Some(Box::new(LockingSink::new()) as BatchSink<B::Arm>);
            }
            ParallelMode::BoundedQueue => {
                input = Box::new(BoundedSink::new(assembler.upper()));
                batches = None;
            }
        }
        debug!(copies = config.copies, mode = ?config.mode, lower = assembler.lower(), upper = assembler.upper(), "parallel bandit created");
        Ok(Self {
            replicas,
            input,
            batches,
            assembler,
            mode: config.mode,
            assumptions_lock: config.assumptions_lock,
            random: RandomSequence::new(config.seed),
        })
    }

    pub fn copies(&self) -> usize {
        self.replicas.len()
    }

    pub fn mode(&self) -> ParallelMode {
        self.mode
    }

    pub fn batch_size(&self) -> RangeInclusive<usize> {
        self.assembler.lower()..=self.assembler.upper()
    }

    /// Read access to one replica, blocking until available.
    pub fn replica(&self, index: usize) -> Option<RwLockReadGuard<'_, B>> {
        self.replicas.get(index).map(|r| r.read())
    }

    /// Run `f` on whichever replica can be read-locked first.
    ///
    /// Replicas are tried in a random order; a fully contended pass yields the
    /// thread and retries with a fresh order.
    pub fn read_any<R>(&self, mut f: impl FnMut(&B) -> R) -> R {
        loop {
            let order = permutation(self.replicas.len(), &mut self.random.next());
            for i in order {
                if let Some(guard) = self.replicas[i].try_read() {
                    return f(&*guard);
                }
            }
            thread::yield_now();
        }
    }

    /// Like [`read_any`](Self::read_any) with a write lock.
    pub fn write_any<R>(&self, mut f: impl FnMut(&mut B) -> R) -> R {
        loop {
            let order = permutation(self.replicas.len(), &mut self.random.next());
            for i in order {
                if let Some(mut guard) = self.replicas[i].try_write() {
                    return f(&mut *guard);
                }
            }
            thread::yield_now();
        }
    }

    /// Queue one update.
    pub fn update(&self, arm: B::Arm, result: f64, weight: f64) {
        self.input.add(UpdateEvent::single(arm, result, weight));
    }

    /// Queue several updates; `weights` default to 1.0.
    pub fn update_all(&self, arms: Vec<B::Arm>, results: Vec<f64>, weights: Option<Vec<f64>>) -> Result<()> {
        let n = check_lengths(arms.len(), results.len(), weights.as_ref().map(Vec::len))?;
        if n == 0 {
            return Ok(());
        }
        match &self.batches {
            Some(batches) if self.mode == ParallelMode::NonBlocking && self.assembler.fits(n) => {
                let weights = weights.unwrap_or_else(|| vec![1.0; n]);
                batches.add(Batch {
                    arms,
                    results,
                    weights,
                });
            }
            Some(_) => self.input.add(UpdateEvent::batch(arms, results, weights)),
            None => {
                for (i, (arm, result)) in arms.into_iter().zip(results).enumerate() {
                    let weight = weights.as_ref().map_or(1.0, |w| w[i]);
                    self.input.add(UpdateEvent::single(arm, result, weight));
                }
            }
        }
        Ok(())
    }

    /// Apply queued updates to every replica.
    ///
    /// With `block`, waits for at least `lower` queued updates where the mode
    /// supports it. Returns the number of updates applied by this call; zero
    /// means nothing was pending.
    pub fn process_updates(&self, block: bool) -> usize {
        let min = if block { self.assembler.lower() } else { 0 };
        let Some(batches) = &self.batches else {
            let events = self.input.drain(min);
            if events.is_empty() {
                return 0;
            }
            return self.apply(&collect_all(events));
        };
        if let Some(batch) = batches.remove() {
            return self.apply(&batch);
        }
        let events = self.input.drain(min);
        if events.is_empty() {
            return 0;
        }
        for batch in self.assembler.assemble(events) {
            batches.add(batch);
        }
        match batches.remove() {
            Some(batch) => self.apply(&batch),
            None => 0,
        }
    }

    /// Drain without blocking until nothing is pending. Returns the total
    /// number of updates applied.
    ///
    /// Only updates still queued are seen: a batch another thread has already
    /// drained but not yet applied is not waited for. Call it after
    /// [`close`](Self::close) or [`Updater::stop`](crate::Updater::stop) when an
    /// updater thread is running.
    pub fn await_completion(&self) -> usize {
        let mut total = 0;
        loop {
            let n = self.process_updates(false);
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    fn apply(&self, batch: &Batch<B::Arm>) -> usize {
        for replica in &self.replicas {
            let mut bandit = replica.write();
            if let Err(e) = bandit.update_all(&batch.arms, &batch.results, Some(&batch.weights)) {
                warn!(error = %e, size = batch.len(), "batch rejected, applying updates one by one");
                for ((arm, &result), &weight) in batch.arms.iter().zip(&batch.results).zip(&batch.weights) {
                    if let Err(e) = bandit.update(arm.clone(), result, weight) {
                        debug!(error = %e, "dropping invalid update");
                    }
                }
            }
        }
        batch.len()
    }

    /// Queued events and assembled batches not yet applied.
    pub fn pending(&self) -> usize {
        let queued: usize = self.batches.as_ref().map_or(0, |b| b.len());
        queued + self.input.len()
    }

    /// Close the sinks: blocked drains and producers wake up and no call blocks
    /// afterwards.
    pub fn close(&self) {
        self.input.close();
        if let Some(b) = &self.batches {
            b.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.input.is_closed()
    }

    /// Statistics of the first replica.
    pub fn export_data(&self) -> B::Data {
        self.replicas[0].read().export_data()
    }

    /// Import into every replica.
    pub fn import_data(&self, data: B::Data, restructure: bool) -> Result<()> {
        for replica in &self.replicas {
            replica.write().import_data(data.clone(), restructure)?;
        }
        Ok(())
    }

    /// Telemetry of the first replica.
    pub fn rewards(&self) -> Box<dyn DataSample> {
        self.replicas[0].read().rewards()
    }

    pub fn maximize(&self) -> bool {
        self.replicas[0].read().maximize()
    }
}

impl<P: BanditPolicy> ParallelBandit<MultiArmedBandit<P>> {
    /// Replicate `bandit`; replica `i` is reseeded with `seed + i`.
    pub fn replicate(bandit: MultiArmedBandit<P>, config: ParallelConfig) -> Result<Self> {
        let seed = bandit.seed();
        Self::new(config, |i| Ok(bandit.reseeded(seed.wrapping_add(i as u64))))
    }

    /// Build replicas from a policy and bandit settings.
    pub fn with_arms(nbr_arms: usize, policy: P, bandit: BanditConfig, config: ParallelConfig) -> Result<Self> {
        Self::replicate(MultiArmedBandit::new(nbr_arms, policy, bandit)?, config)
    }

    pub fn choose(&self) -> usize {
        self.read_any(|b| b.choose())
    }

    pub fn optimal(&self) -> usize {
        self.read_any(|b| b.optimal())
    }
}

impl<K: Instance, P: BanditPolicy> ParallelBandit<KeyedBandit<K, P>> {
    /// Replicate a keyed `bandit`; replica `i` is reseeded with `seed + i`.
    pub fn replicate_keyed(bandit: KeyedBandit<K, P>, config: ParallelConfig) -> Result<Self> {
        let seed = bandit.seed();
        Self::new(config, |i| Ok(bandit.reseeded(seed.wrapping_add(i as u64))))
    }

    /// Select on a free replica. With `assumptions_lock` and non-empty
    /// assumptions, a write lock is taken so a new arm can be generated.
    pub fn choose(&self, assumptions: &[Literal]) -> Result<K> {
        if self.assumptions_lock && !assumptions.is_empty() {
            self.write_any(|b| b.choose_or_generate(assumptions))
        } else {
            self.read_any(|b| b.choose(assumptions))
        }
    }

    pub fn optimal(&self, assumptions: &[Literal]) -> Result<K> {
        self.read_any(|b| b.optimal(assumptions))
    }
}

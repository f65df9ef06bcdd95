//! Seeded, thread-safe source of per-call random generators.
//!
//! A [`RandomSequence`] hands out a fresh `StdRng` for every call. The internal
//! state advances atomically, so concurrent callers always get distinct
//! generators and a single-threaded replay with the same seed reproduces the
//! same sequence of generators.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const MULTIPLIER: u64 = 741_103_587;

#[derive(Debug)]
pub struct RandomSequence {
    state: AtomicU64,
}

impl RandomSequence {
    pub fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Advance the sequence and return a generator seeded from the new state.
    pub fn next(&self) -> StdRng {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let next = current.wrapping_add(1).wrapping_mul(MULTIPLIER);
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return StdRng::seed_from_u64(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Current state, usable to seed a copy of this sequence.
    pub fn state(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }
}

impl Clone for RandomSequence {
    fn clone(&self) -> Self {
        Self::new(self.state())
    }
}

impl Default for RandomSequence {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Uniformly random permutation of `0..n`.
pub fn permutation(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    idx
}

//! Reward telemetry collectors.
//!
//! A bandit writes every observed reward into its [`DataSample`] but never reads
//! it back; the collector exists for callers who want to plot or summarize the
//! reward stream.

use std::fmt::Debug;

use crate::estimator::{RunningVariance, VarianceEstimator};

/// Sink for a stream of weighted reward values.
pub trait DataSample: Debug + Send + Sync {
    fn accept(&mut self, value: f64, weight: f64);

    /// Number of `accept` calls seen (weights are not summed).
    fn nbr_samples(&self) -> u64;

    /// Available data points or bucket estimates.
    fn values(&self) -> Vec<f64>;

    /// X-axis label for each entry in `values`.
    fn labels(&self) -> Vec<u64>;

    fn copy(&self) -> Box<dyn DataSample>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidSample;

impl DataSample for VoidSample {
    fn accept(&mut self, _value: f64, _weight: f64) {}

    fn nbr_samples(&self) -> u64 {
        0
    }

    fn values(&self) -> Vec<f64> {
        Vec::new()
    }

    fn labels(&self) -> Vec<u64> {
        Vec::new()
    }

    fn copy(&self) -> Box<dyn DataSample> {
        Box::new(*self)
    }
}

/// Running count, mean and variance of all rewards.
#[derive(Debug, Clone, Default)]
pub struct RewardSample {
    stats: RunningVariance,
    count: u64,
}

impl RewardSample {
    pub fn stats(&self) -> &RunningVariance {
        &self.stats
    }
}

impl DataSample for RewardSample {
    fn accept(&mut self, value: f64, weight: f64) {
        self.stats.accept(value, weight);
        self.count += 1;
    }

    fn nbr_samples(&self) -> u64 {
        self.count
    }

    fn values(&self) -> Vec<f64> {
        vec![self.stats.mean()]
    }

    fn labels(&self) -> Vec<u64> {
        vec![self.count]
    }

    fn copy(&self) -> Box<dyn DataSample> {
        Box::new(self.clone())
    }
}

/// Fixed-size reward history whose buckets double in width as data arrives.
///
/// Once every bucket is full, adjacent pairs are merged and the bucket width
/// doubles, so memory stays constant while the whole history stays covered.
#[derive(Debug, Clone)]
pub struct BucketSample {
    data: Vec<RunningVariance>,
    nbr_buckets: usize,
    samples_per_bucket: u64,
    nbr_samples: u64,
}

impl BucketSample {
    /// `max_size` is rounded up to the next even number (minimum 2).
    pub fn new(max_size: usize) -> Self {
        let size = (max_size.max(2) + 1) & !1;
        Self {
            data: vec![RunningVariance::default(); size],
            nbr_buckets: 0,
            samples_per_bucket: 1,
            nbr_samples: 0,
        }
    }

    pub fn samples_per_bucket(&self) -> u64 {
        self.samples_per_bucket
    }
}

impl Default for BucketSample {
    fn default() -> Self {
        Self::new(10)
    }
}

impl DataSample for BucketSample {
    fn accept(&mut self, value: f64, _weight: f64) {
        let size = self.data.len();
        if self.samples_per_bucket * size as u64 == self.nbr_samples {
            for i in (0..size).step_by(2) {
                self.data[i / 2] = self.data[i].combine(&self.data[i + 1]);
            }
            self.nbr_buckets = size / 2;
            for bucket in &mut self.data[self.nbr_buckets..] {
                *bucket = RunningVariance::default();
            }
            self.samples_per_bucket *= 2;
        }
        self.data[self.nbr_buckets].accept(value, 1.0);
        self.nbr_samples += 1;
        if self.nbr_samples % self.samples_per_bucket == 0 {
            self.nbr_buckets += 1;
        }
    }

    fn nbr_samples(&self) -> u64 {
        self.nbr_samples
    }

    fn values(&self) -> Vec<f64> {
        self.data[..self.nbr_buckets].iter().map(|b| b.mean()).collect()
    }

    fn labels(&self) -> Vec<u64> {
        (1..=self.nbr_buckets as u64)
            .map(|i| i * self.samples_per_bucket)
            .collect()
    }

    fn copy(&self) -> Box<dyn DataSample> {
        Box::new(self.clone())
    }
}

//! Conjugate posteriors used by Thompson sampling.
//!
//! Each posterior interprets the per-arm [`RunningVariance`] as sufficient
//! statistics of its likelihood and draws a plausible mean reward from it.
//! Priors are pseudo-observations returned by [`ConjugateModel::default_prior`].
//!
//! Posteriors that read only their own arm implement [`Posterior`]; those that
//! pool information across arms implement [`PooledPosterior`] instead and can
//! only be driven by [`PooledThompsonSampling`](crate::PooledThompsonSampling).
//!
//! Draws that come out non-finite (a Gamma draw of zero, say) are retried a
//! bounded number of times; if every retry fails the arm's sample mean is
//! returned instead.

use std::fmt::Debug;

use rand::rngs::StdRng;
use rand_distr::{Beta, Distribution, Gamma, Normal};

use crate::estimator::{RunningVariance, VarianceEstimator};

const MAX_RETRIES: usize = 64;

/// How observations are folded into arm statistics, and the prior they start from.
pub trait ConjugateModel: Clone + Debug + Send + Sync + 'static {
    /// Fold an observation into the arm statistics.
    fn update(&self, stat: &mut RunningVariance, value: f64, weight: f64) {
        stat.accept(value, weight);
    }

    fn default_prior(&self) -> RunningVariance;
}

/// A posterior sampled from one arm's statistics alone.
pub trait Posterior: ConjugateModel {
    /// Draw one plausible mean for the arm described by `stat`.
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64;
}

/// A posterior whose draws also read the cross-arm [`PooledVariance`].
pub trait PooledPosterior: ConjugateModel {
    fn sample_pooled(&self, stat: &RunningVariance, pool: &PooledVariance, rng: &mut StdRng) -> f64;
}

fn gamma(shape: f64, rng: &mut StdRng) -> f64 {
    match Gamma::new(shape, 1.0) {
        Ok(d) => d.sample(rng),
        Err(_) => f64::NAN,
    }
}

fn beta(alpha: f64, beta: f64, rng: &mut StdRng) -> f64 {
    match Beta::new(alpha, beta) {
        Ok(d) => d.sample(rng),
        Err(_) => f64::NAN,
    }
}

fn normal(mean: f64, std_dev: f64, rng: &mut StdRng) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(d) => d.sample(rng),
        Err(_) => f64::NAN,
    }
}

fn retry(stat: &RunningVariance, mut draw: impl FnMut() -> f64) -> f64 {
    for _ in 0..MAX_RETRIES {
        let v = draw();
        if v.is_finite() {
            return v;
        }
    }
    stat.mean()
}

/// Aggregate over every live arm, used for partial pooling.
///
/// Holds the grand mean of arm means, the squared deviations of those means,
/// the total within-arm squared deviations and the total weighted sample
/// count. All of it starts from the prior and is maintained incrementally as
/// arms are added, removed and updated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PooledVariance {
    means: RunningVariance,
    squared_total_deviations: f64,
    nbr_weighted_samples: f64,
    nbr_arms: usize,
}

impl PooledVariance {
    pub fn new(prior: &RunningVariance) -> Self {
        Self {
            means: *prior,
            squared_total_deviations: prior.squared_deviations(),
            nbr_weighted_samples: prior.nbr_weighted_samples(),
            nbr_arms: 0,
        }
    }

    pub fn add_arm(&mut self, data: &RunningVariance) {
        self.means.accept(data.mean(), 1.0);
        self.squared_total_deviations += data.squared_deviations();
        self.nbr_weighted_samples += data.nbr_weighted_samples();
        self.nbr_arms += 1;
    }

    pub fn remove_arm(&mut self, data: &RunningVariance) {
        if self.nbr_arms == 0 {
            return;
        }
        self.means.remove(data.mean(), 1.0);
        self.squared_total_deviations = (self.squared_total_deviations - data.squared_deviations()).max(0.0);
        self.nbr_weighted_samples = (self.nbr_weighted_samples - data.nbr_weighted_samples()).max(0.0);
        self.nbr_arms -= 1;
    }

    pub fn nbr_arms(&self) -> usize {
        self.nbr_arms
    }

    pub fn grand_mean(&self) -> f64 {
        self.means.mean()
    }

    pub fn squared_mean_deviations(&self) -> f64 {
        self.means.squared_deviations()
    }

    pub fn squared_total_deviations(&self) -> f64 {
        self.squared_total_deviations
    }

    pub fn nbr_weighted_samples(&self) -> f64 {
        self.nbr_weighted_samples
    }
}

/// Bernoulli rewards with a Beta posterior. Prior: one success in two trials.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinomialPosterior;

impl ConjugateModel for BinomialPosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(0.5, 0.5, 2.0)
    }
}

impl Posterior for BinomialPosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        let alpha = stat.sum();
        let b = stat.nbr_weighted_samples() - alpha;
        retry(stat, || beta(alpha, b, rng))
    }
}

/// Count rewards with a Gamma posterior over the rate.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoissonPosterior;

impl ConjugateModel for PoissonPosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(1.0, 0.0, 0.01)
    }
}

impl Posterior for PoissonPosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        retry(stat, || gamma(stat.sum(), rng) / stat.nbr_weighted_samples())
    }
}

/// Number-of-trials rewards (values `>= 1`) with a Beta posterior over the
/// success probability.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeometricPosterior;

impl ConjugateModel for GeometricPosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(2.0, 0.0, 1.0)
    }
}

impl Posterior for GeometricPosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        let n = stat.nbr_weighted_samples();
        retry(stat, || beta(n, stat.sum() - n, rng))
    }
}

/// Normal rewards with unknown mean and variance (Normal-Inverse-Gamma).
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalPosterior;

fn sample_normal(stat: &RunningVariance, rng: &mut StdRng) -> (f64, f64) {
    let n = stat.nbr_weighted_samples();
    for _ in 0..MAX_RETRIES {
        let variance = (stat.squared_deviations() / 2.0) / gamma(n / 2.0, rng);
        if !variance.is_finite() {
            continue;
        }
        let value = normal(stat.mean(), (variance / n).sqrt(), rng);
        if value.is_finite() {
            return (value, variance);
        }
    }
    (stat.mean(), stat.variance())
}

impl ConjugateModel for NormalPosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(0.0, 0.02, 0.02)
    }
}

impl Posterior for NormalPosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        sample_normal(stat, rng).0
    }
}

/// Log-normal rewards; statistics are kept in log space.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogNormalPosterior;

impl ConjugateModel for LogNormalPosterior {
    fn update(&self, stat: &mut RunningVariance, value: f64, weight: f64) {
        stat.accept(value.ln(), weight);
    }

    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(0.0, 0.02, 2.0)
    }
}

impl Posterior for LogNormalPosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        for _ in 0..MAX_RETRIES {
            let (mean, variance) = sample_normal(stat, rng);
            let value = (mean + variance / 2.0).exp();
            if value.is_finite() {
                return value;
            }
        }
        stat.mean().exp()
    }
}

/// Exponentially distributed rewards; samples the rate `1 / mean`.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExponentialPosterior;

impl ConjugateModel for ExponentialPosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(1.0, 0.0, 0.01)
    }
}

impl Posterior for ExponentialPosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        retry(stat, || gamma(stat.nbr_weighted_samples(), rng) / stat.sum())
    }
}

/// Gamma rewards with a known shape; the expected draw is `shape / mean`.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GammaScalePosterior {
    pub fixed_shape: f64,
}

impl GammaScalePosterior {
    pub fn new(fixed_shape: f64) -> Self {
        Self { fixed_shape }
    }
}

impl ConjugateModel for GammaScalePosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(1.0, 0.0, 0.01)
    }
}

impl Posterior for GammaScalePosterior {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        retry(stat, || {
            gamma(stat.nbr_weighted_samples() * self.fixed_shape, rng) / stat.sum()
        })
    }
}

/// Normal rewards with partial pooling of arm means (hierarchical model).
///
/// Draws a between-arm variance and a within-arm error variance from
/// Inverse-Gamma distributions, then samples the arm mean from the
/// precision-weighted combination of the grand mean and the arm's own mean.
/// Only [`PooledThompsonSampling`](crate::PooledThompsonSampling) can drive it:
///
/// ```compile_fail
/// use combo_bandit::{HierarchicalNormalPosterior, ThompsonSampling};
///
/// let _ = ThompsonSampling::new(HierarchicalNormalPosterior);
/// ```
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchicalNormalPosterior;

impl ConjugateModel for HierarchicalNormalPosterior {
    fn default_prior(&self) -> RunningVariance {
        RunningVariance::new(0.0, 0.02, 0.02)
    }
}

impl PooledPosterior for HierarchicalNormalPosterior {
    fn sample_pooled(&self, stat: &RunningVariance, pool: &PooledVariance, rng: &mut StdRng) -> f64 {
        let k = pool.nbr_arms() as f64;
        let n = stat.nbr_weighted_samples();
        for _ in 0..MAX_RETRIES {
            let pooled_alpha = pool.nbr_weighted_samples().min(k) / 2.0;
            let pool_var = (pool.squared_mean_deviations() / 2.0) / gamma(pooled_alpha, rng);
            if !pool_var.is_finite() {
                continue;
            }
            let group_alpha = (pool.nbr_weighted_samples() - k).max(1.0) / 2.0;
            let error_var = (pool.squared_total_deviations() / 2.0) / gamma(group_alpha, rng);
            if !error_var.is_finite() {
                continue;
            }
            let q = 1.0 / (1.0 / pool_var + n / error_var);
            let mean = (pool.grand_mean() / pool_var + stat.mean() * n / error_var) * q;
            let value = normal(mean, q.sqrt(), rng);
            if value.is_finite() {
                return value;
            }
        }
        stat.mean()
    }
}

/// Wraps a posterior, transforming every observed value before it is stored.
///
/// Samples the way `P` does, pooled or not.
#[derive(Debug, Clone, Copy)]
pub struct Transformed<P> {
    inner: P,
    transform: fn(f64) -> f64,
}

impl<P: ConjugateModel> Transformed<P> {
    pub fn new(inner: P, transform: fn(f64) -> f64) -> Self {
        Self { inner, transform }
    }
}

impl<P: ConjugateModel> ConjugateModel for Transformed<P> {
    fn update(&self, stat: &mut RunningVariance, value: f64, weight: f64) {
        self.inner.update(stat, (self.transform)(value), weight);
    }

    fn default_prior(&self) -> RunningVariance {
        self.inner.default_prior()
    }
}

impl<P: Posterior> Posterior for Transformed<P> {
    fn sample(&self, stat: &RunningVariance, rng: &mut StdRng) -> f64 {
        self.inner.sample(stat, rng)
    }
}

impl<P: PooledPosterior> PooledPosterior for Transformed<P> {
    fn sample_pooled(&self, stat: &RunningVariance, pool: &PooledVariance, rng: &mut StdRng) -> f64 {
        self.inner.sample_pooled(stat, pool, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn mean_of_draws<P: Posterior>(p: &P, stat: &RunningVariance) -> f64 {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 2000;
        (0..n).map(|_| p.sample(stat, &mut rng)).sum::<f64>() / n as f64
    }

    fn mean_of_pooled_draws<P: PooledPosterior>(p: &P, stat: &RunningVariance, pool: &PooledVariance) -> f64 {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 2000;
        (0..n).map(|_| p.sample_pooled(stat, pool, &mut rng)).sum::<f64>() / n as f64
    }

    fn observe<P: ConjugateModel>(p: &P, values: &[f64]) -> RunningVariance {
        let mut stat = p.default_prior();
        for &v in values {
            p.update(&mut stat, v, 1.0);
        }
        stat
    }

    #[test]
    fn binomial_concentrates_on_success_rate() {
        let p = BinomialPosterior;
        let values: Vec<f64> = (0..200).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        let stat = observe(&p, &values);
        let m = mean_of_draws(&p, &stat);
        assert!((m - 0.25).abs() < 0.05, "m={m}");
    }

    #[test]
    fn normal_concentrates_on_sample_mean() {
        let p = NormalPosterior;
        let values: Vec<f64> = (0..100).map(|i| 3.0 + (i % 5) as f64 * 0.1).collect();
        let stat = observe(&p, &values);
        let m = mean_of_draws(&p, &stat);
        assert!((m - stat.mean()).abs() < 0.05, "m={m}");
    }

    #[test]
    fn poisson_and_exponential_track_rate() {
        let values = vec![2.0; 200];
        let poisson = observe(&PoissonPosterior, &values);
        assert!((mean_of_draws(&PoissonPosterior, &poisson) - 2.0).abs() < 0.1);
        let exp = observe(&ExponentialPosterior, &values);
        assert!((mean_of_draws(&ExponentialPosterior, &exp) - 0.5).abs() < 0.05);
        let gs = GammaScalePosterior::new(2.0);
        let stat = observe(&gs, &values);
        assert!((mean_of_draws(&gs, &stat) - 1.0).abs() < 0.1);
    }

    #[test]
    fn geometric_tracks_success_probability() {
        let p = GeometricPosterior;
        let stat = observe(&p, &vec![4.0; 200]);
        assert!((mean_of_draws(&p, &stat) - 0.25).abs() < 0.05);
    }

    #[test]
    fn log_normal_updates_in_log_space() {
        let p = LogNormalPosterior;
        let stat = observe(&p, &[std::f64::consts::E; 10]);
        assert!(stat.mean() > 0.8 && stat.mean() < 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(p.sample(&stat, &mut rng) > 0.0);
    }

    #[test]
    fn hierarchical_draws_are_finite_and_shrink_toward_arm_mean() {
        let p = HierarchicalNormalPosterior;
        let prior = p.default_prior();
        let mut pool = PooledVariance::new(&prior);
        let a = observe(&p, &vec![1.0; 50]);
        let b = observe(&p, &[5.0, 5.2, 4.8, 5.1, 4.9, 5.0, 5.0, 5.0]);
        pool.add_arm(&a);
        pool.add_arm(&b);
        let m = mean_of_pooled_draws(&p, &b, &pool);
        assert!(m.is_finite());
        assert!(m > 3.0, "m={m}");
    }

    #[test]
    fn pooled_draws_use_other_arms() {
        // Same arm data and seed: the pooled draws depend on the pool, the
        // unpooled Normal draws cannot.
        let p = HierarchicalNormalPosterior;
        let prior = p.default_prior();
        let arm = observe(&p, &[2.0, 2.5, 1.5, 2.2]);

        let mut near = PooledVariance::new(&prior);
        near.add_arm(&arm);
        near.add_arm(&observe(&p, &vec![2.0; 40]));
        let mut far = PooledVariance::new(&prior);
        far.add_arm(&arm);
        far.add_arm(&observe(&p, &vec![-40.0; 40]));

        let unpooled = mean_of_draws(&NormalPosterior, &arm);
        let with_near = mean_of_pooled_draws(&p, &arm, &near);
        let with_far = mean_of_pooled_draws(&p, &arm, &far);
        assert!(with_near.is_finite() && with_far.is_finite());
        assert_ne!(with_near, with_far);
        assert_ne!(with_near, unpooled);
    }

    #[test]
    fn pool_add_remove_restores_aggregate() {
        let prior = NormalPosterior.default_prior();
        let mut pool = PooledVariance::new(&prior);
        let a = observe(&NormalPosterior, &[1.0, 2.0, 3.0]);
        let b = observe(&NormalPosterior, &[10.0]);
        pool.add_arm(&a);
        let snapshot = pool.clone();
        pool.add_arm(&b);
        assert_eq!(pool.nbr_arms(), 2);
        pool.remove_arm(&b);
        assert_eq!(pool.nbr_arms(), 1);
        assert!((pool.grand_mean() - snapshot.grand_mean()).abs() < 1e-9);
        assert!((pool.nbr_weighted_samples() - snapshot.nbr_weighted_samples()).abs() < 1e-9);
    }

    #[test]
    fn transformed_applies_before_storing() {
        let p = Transformed::new(NormalPosterior, |x| x * 10.0);
        let stat = observe(&p, &[1.0, 1.0]);
        assert!(stat.mean() > 9.0);
    }

    #[test]
    fn transformed_keeps_pooling() {
        let p = Transformed::new(HierarchicalNormalPosterior, |x| x + 1.0);
        let prior = p.default_prior();
        let mut pool = PooledVariance::new(&prior);
        let arm = observe(&p, &[1.0, 1.0, 1.0]);
        pool.add_arm(&arm);
        pool.add_arm(&observe(&p, &[3.0, 3.0]));
        assert!(mean_of_pooled_draws(&p, &arm, &pool).is_finite());
    }
}

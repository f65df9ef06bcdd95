use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use combo_bandit::{
    Bandit, BanditConfig, BanditPolicy, BatchAssembler, EpsilonGreedy, MultiArmedBandit, NormalPosterior,
    ThompsonSampling, Ucb1Tuned, UpdateEvent,
};
use std::hint::black_box;

/// A bandit with every arm already updated a few times, so selection runs on
/// warm statistics.
fn warm<P: BanditPolicy>(n_arms: usize, policy: P) -> MultiArmedBandit<P> {
    let mut b = MultiArmedBandit::new(n_arms, policy, BanditConfig::default().with_seed(1)).unwrap();
    let arms: Vec<usize> = (0..n_arms * 4).map(|i| i % n_arms).collect();
    let results: Vec<f64> = arms.iter().map(|&a| ((a * 31 + 7) % 13) as f64 / 13.0).collect();
    b.update_all(&arms, &results, None).unwrap();
    b
}

fn bench_choose(c: &mut Criterion) {
    let mut group = c.benchmark_group("choose");
    for &n_arms in &[4usize, 32usize, 256usize] {
        let thompson = warm(n_arms, ThompsonSampling::new(NormalPosterior));
        group.bench_with_input(BenchmarkId::new("thompson_normal", n_arms), &n_arms, |b, &_n| {
            b.iter(|| black_box(thompson.choose()))
        });

        let tuned = warm(n_arms, Ucb1Tuned::default());
        group.bench_with_input(BenchmarkId::new("ucb1_tuned", n_arms), &n_arms, |b, &_n| {
            b.iter(|| black_box(tuned.choose()))
        });

        let eps = warm(n_arms, EpsilonGreedy::new(0.1).unwrap());
        group.bench_with_input(BenchmarkId::new("epsilon_greedy", n_arms), &n_arms, |b, &_n| {
            b.iter(|| black_box(eps.choose()))
        });
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let assembler = BatchAssembler::new(16..=64).unwrap();
    for &n_events in &[100usize, 1_000usize] {
        group.bench_with_input(BenchmarkId::new("mixed", n_events), &n_events, |b, &n| {
            b.iter(|| {
                let events: Vec<UpdateEvent<usize>> = (0..n)
                    .map(|i| {
                        if i % 5 == 0 {
                            UpdateEvent::batch(vec![i % 7; 9], vec![1.0; 9], None)
                        } else {
                            UpdateEvent::single(i % 7, 1.0, 1.0)
                        }
                    })
                    .collect();
                black_box(assembler.assemble(events).len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_choose, bench_assemble);
criterion_main!(benches);

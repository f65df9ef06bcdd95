use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use combo_bandit::{
    Bandit, BanditConfig, KeyedBandit, Labeling, MultiArmedBandit, ParallelBandit, ParallelConfig, ParallelMode,
    Ucb1, Updater, VarianceEstimator,
};
use proptest::prelude::*;

const MODES: [ParallelMode; 3] = [
    ParallelMode::NonBlocking,
    ParallelMode::BlockingSupported,
    ParallelMode::BoundedQueue,
];

fn parallel(
    arms: usize,
    mode: ParallelMode,
    copies: usize,
    lower: usize,
    upper: usize,
) -> ParallelBandit<MultiArmedBandit<Ucb1>> {
    let config = ParallelConfig::default()
        .with_mode(mode)
        .with_copies(copies)
        .with_batch_size(lower..=upper);
    ParallelBandit::with_arms(arms, Ucb1::default(), BanditConfig::default(), config).unwrap()
}

fn weight_per_arm(p: &ParallelBandit<MultiArmedBandit<Ucb1>>, replica: usize) -> Vec<f64> {
    p.replica(replica)
        .unwrap()
        .export_data()
        .iter()
        .map(|e| e.nbr_weighted_samples())
        .collect()
}

// ----------------------------------------------------------------------------
// Producers + updater thread
// ----------------------------------------------------------------------------

#[test]
fn no_lost_updates_under_load() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 500;
    for mode in MODES {
        let p = Arc::new(parallel(4, mode, 3, 8, 32));
        let updater = Updater::spawn(Arc::clone(&p));
        let producers: Vec<_> = (0..THREADS)
            .map(|t| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let arm = p.choose();
                        p.update((arm + t + i) % 4, 1.0, 1.0);
                    }
                })
            })
            .collect();
        for h in producers {
            h.join().unwrap();
        }
        assert_eq!(updater.stop(), THREADS * PER_THREAD, "{mode:?}");
        for r in 0..3 {
            let total: f64 = weight_per_arm(&p, r).iter().sum();
            assert_eq!(total, (THREADS * PER_THREAD) as f64, "{mode:?} replica {r}");
        }
        assert_eq!(p.pending(), 0);
    }
}

#[test]
fn bounded_queue_blocks_producers_at_capacity() {
    let p = Arc::new(parallel(2, ParallelMode::BoundedQueue, 1, 1, 4));
    let added = Arc::new(AtomicUsize::new(0));
    let producer = {
        let p = Arc::clone(&p);
        let added = Arc::clone(&added);
        thread::spawn(move || {
            for i in 0..6 {
                p.update(i % 2, 1.0, 1.0);
                added.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while added.load(Ordering::SeqCst) < 4 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(50));
    assert_eq!(added.load(Ordering::SeqCst), 4);
    assert_eq!(p.pending(), 4);

    assert_eq!(p.process_updates(false), 4);
    producer.join().unwrap();
    assert_eq!(added.load(Ordering::SeqCst), 6);
    assert_eq!(p.await_completion(), 2);
}

#[test]
fn non_blocking_producers_never_wait() {
    let p = parallel(3, ParallelMode::NonBlocking, 2, 1, 8);
    for i in 0..10_000 {
        p.update(i % 3, 1.0, 1.0);
    }
    assert_eq!(p.pending(), 10_000);
    assert_eq!(p.await_completion(), 10_000);
}

#[test]
fn locking_updater_waits_for_lower_bound() {
    let p = Arc::new(parallel(2, ParallelMode::BlockingSupported, 1, 3, 10));
    let worker = {
        let p = Arc::clone(&p);
        thread::spawn(move || p.process_updates(true))
    };
    p.update(0, 1.0, 1.0);
    p.update(1, 1.0, 1.0);
    thread::sleep(Duration::from_millis(30));
    assert!(!worker.is_finished());
    p.update(0, 1.0, 1.0);
    assert_eq!(worker.join().unwrap(), 3);
}

#[test]
fn close_releases_a_waiting_updater() {
    let p = Arc::new(parallel(2, ParallelMode::BlockingSupported, 1, 5, 10));
    let worker = {
        let p = Arc::clone(&p);
        thread::spawn(move || p.process_updates(true))
    };
    p.update(0, 1.0, 1.0);
    thread::sleep(Duration::from_millis(20));
    p.close();
    assert_eq!(worker.join().unwrap(), 1);
    assert!(p.is_closed());
}

#[test]
fn await_completion_after_stop_finds_nothing_left() {
    let p = Arc::new(parallel(2, ParallelMode::BlockingSupported, 2, 1, 4));
    let updater = Updater::spawn(Arc::clone(&p));
    for i in 0..100 {
        p.update(i % 2, 1.0, 1.0);
    }
    assert_eq!(updater.stop(), 100);
    assert_eq!(p.await_completion(), 0);
    for r in 0..2 {
        assert_eq!(weight_per_arm(&p, r).iter().sum::<f64>(), 100.0);
    }
}

// ----------------------------------------------------------------------------
// Replicating either kind of bandit
// ----------------------------------------------------------------------------

#[test]
fn replicate_plain_and_keyed_bandits() {
    let config = ParallelConfig::default().with_copies(2).with_batch_size(1..=8);

    let plain = MultiArmedBandit::new(3, Ucb1::default(), BanditConfig::default()).unwrap();
    let plain = ParallelBandit::replicate(plain, config.clone()).unwrap();
    plain.update(2, 5.0, 1.0);
    plain.await_completion();
    assert_eq!(plain.optimal(), 2);

    let yes = Labeling::new(vec![true]);
    let no = Labeling::new(vec![false]);
    let keyed = KeyedBandit::new([yes.clone(), no.clone()], Ucb1::default(), BanditConfig::default());
    let keyed = ParallelBandit::replicate_keyed(keyed, config).unwrap();
    keyed.update(no.clone(), 5.0, 1.0);
    keyed.update(yes, 1.0, 1.0);
    keyed.await_completion();
    assert_eq!(keyed.optimal(&[]).unwrap(), no);
    assert_eq!(keyed.replica(1).unwrap().export_data().len(), 2);
}

// ----------------------------------------------------------------------------
// Every mode, every replica count: exactly-once delivery
// ----------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_replica_sees_every_update_once(
        copies in 1usize..=5,
        mode_index in 0usize..3,
        lower in 1usize..=6,
        extra in 0usize..=10,
        chunk in 1usize..=12,
        updates in prop::collection::vec((0usize..3, 1u8..=3), 0..120),
    ) {
        let mode = MODES[mode_index];
        let upper = lower + extra;
        let p = parallel(3, mode, copies, lower, upper);

        let mut expected = vec![0.0; 3];
        let mut applied = 0;
        for part in updates.chunks(chunk) {
            for &(arm, w) in part {
                expected[arm] += w as f64;
            }
            if mode == ParallelMode::BoundedQueue {
                for &(arm, w) in part {
                    if p.pending() >= upper {
                        let n = p.process_updates(false);
                        prop_assert!(n <= upper);
                        applied += n;
                    }
                    p.update(arm, 1.0, w as f64);
                }
            } else {
                let arms = part.iter().map(|&(a, _)| a).collect();
                let weights = part.iter().map(|&(_, w)| w as f64).collect();
                p.update_all(arms, vec![1.0; part.len()], Some(weights)).unwrap();
            }
        }

        loop {
            let n = p.process_updates(false);
            if n == 0 {
                break;
            }
            prop_assert!(n <= upper, "batch of {} over {}", n, upper);
            applied += n;
        }
        prop_assert_eq!(applied, updates.len());
        prop_assert_eq!(p.pending(), 0);

        let first = p.replica(0).unwrap().export_data();
        for r in 0..copies {
            prop_assert_eq!(weight_per_arm(&p, r), expected.clone());
            prop_assert_eq!(p.replica(r).unwrap().export_data(), first.clone());
        }
    }
}

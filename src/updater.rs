//! Background thread that applies queued updates to a [`ParallelBandit`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::bandit::Bandit;
use crate::parallel::ParallelBandit;

/// Handle to the updater thread.
///
/// The thread loops on `process_updates(true)`, sleeping for `idle` whenever a
/// call applied nothing. [`stop`](Self::stop) (or dropping the handle) closes
/// the bandit's sinks, joins the thread and applies whatever is still queued.
#[derive(Debug)]
pub struct Updater<B: Bandit> {
    bandit: Arc<ParallelBandit<B>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<usize>>,
}

impl<B: Bandit> Updater<B> {
    pub fn spawn(bandit: Arc<ParallelBandit<B>>) -> Self {
        Self::spawn_with_idle(bandit, Duration::from_millis(1))
    }

    pub fn spawn_with_idle(bandit: Arc<ParallelBandit<B>>, idle: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let bandit = Arc::clone(&bandit);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                debug!(copies = bandit.copies(), mode = ?bandit.mode(), "updater started");
                let mut applied = 0;
                while !stop.load(Ordering::Acquire) {
                    let n = bandit.process_updates(true);
                    if n == 0 {
                        thread::sleep(idle);
                    }
                    applied += n;
                }
                applied
            })
        };
        Self {
            bandit,
            stop,
            handle: Some(handle),
        }
    }

    pub fn bandit(&self) -> &Arc<ParallelBandit<B>> {
        &self.bandit
    }

    /// Stop the thread and drain everything still queued. Returns the total
    /// number of updates applied by the thread and the final drain.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        let Some(handle) = self.handle.take() else {
            return 0;
        };
        self.stop.store(true, Ordering::Release);
        self.bandit.close();
        let applied = match handle.join() {
            Ok(n) => n,
            Err(_) => {
                warn!("updater thread panicked");
                0
            }
        };
        let drained = self.bandit.await_completion();
        debug!(applied, drained, "updater stopped");
        applied + drained
    }
}

impl<B: Bandit> Drop for Updater<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

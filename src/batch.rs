//! Turning a stream of queued events into size-bounded batches.

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use tracing::trace;

use crate::error::{BanditError, Result};
use crate::event::{Batch, UpdateEvent};

/// Splits and merges events into batches of exactly `upper` updates, plus one
/// undersized batch for whatever is left at the end of a drain.
///
/// `lower` is the number of queued updates a blocking drain waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAssembler {
    lower: usize,
    upper: usize,
}

impl BatchAssembler {
    pub fn new(range: RangeInclusive<usize>) -> Result<Self> {
        let (lower, upper) = (*range.start(), *range.end());
        if upper == 0 || lower > upper {
            return Err(BanditError::InvalidBatchSize { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> usize {
        self.upper
    }

    /// Whether a batch of `len` updates is already within bounds.
    pub fn fits(&self, len: usize) -> bool {
        (self.lower..=self.upper).contains(&len) && len > 0
    }

    /// Assemble `events` in arrival order.
    pub fn assemble<A>(&self, events: impl IntoIterator<Item = UpdateEvent<A>>) -> Vec<Batch<A>> {
        let mut out = Vec::new();
        let mut buffer: VecDeque<UpdateEvent<A>> = VecDeque::new();
        let mut size = 0usize;
        for event in events {
            size += event.size();
            buffer.push_back(event);
            while size >= self.upper {
                let mut batch = Batch::with_capacity(self.upper);
                while batch.len() < self.upper {
                    let Some(e) = buffer.pop_front() else { break };
                    if let Some(rest) = e.collect_to(&mut batch, self.upper) {
                        buffer.push_front(rest);
                    }
                }
                size -= batch.len();
                out.push(batch);
            }
        }
        if !buffer.is_empty() {
            let tail = collect_all(buffer);
            if !tail.is_empty() {
                out.push(tail);
            }
        }
        trace!(batches = out.len(), upper = self.upper, "assembled batches");
        out
    }
}

/// Concatenate every event into one batch regardless of size.
pub fn collect_all<A>(events: impl IntoIterator<Item = UpdateEvent<A>>) -> Batch<A> {
    let mut batch = Batch::default();
    for e in events {
        let _ = e.collect_to(&mut batch, usize::MAX);
    }
    batch
}

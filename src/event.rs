//! Queued updates and the batches they are assembled into.

/// One or more `(arm, result, weight)` triples waiting to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent<A> {
    Single {
        arm: A,
        result: f64,
        weight: f64,
    },
    Batch {
        arms: Vec<A>,
        results: Vec<f64>,
        /// `None` means every weight is 1.0.
        weights: Option<Vec<f64>>,
    },
}

impl<A> UpdateEvent<A> {
    pub fn single(arm: A, result: f64, weight: f64) -> Self {
        UpdateEvent::Single { arm, result, weight }
    }

    /// Caller guarantees the arrays have equal length.
    pub fn batch(arms: Vec<A>, results: Vec<f64>, weights: Option<Vec<f64>>) -> Self {
        UpdateEvent::Batch {
            arms,
            results,
            weights,
        }
    }

    /// Number of updates carried.
    pub fn size(&self) -> usize {
        match self {
            UpdateEvent::Single { .. } => 1,
            UpdateEvent::Batch { arms, .. } => arms.len(),
        }
    }

    /// Move as many updates as fit below `limit` into `batch`.
    ///
    /// Returns the updates that did not fit, if any.
    pub fn collect_to(self, batch: &mut Batch<A>, limit: usize) -> Option<Self> {
        let room = limit.saturating_sub(batch.len());
        match self {
            UpdateEvent::Single { arm, result, weight } => {
                if room == 0 {
                    return Some(UpdateEvent::Single { arm, result, weight });
                }
                batch.push(arm, result, weight);
                None
            }
            UpdateEvent::Batch {
                mut arms,
                mut results,
                mut weights,
            } => {
                let m = room.min(arms.len());
                let rest_arms = arms.split_off(m);
                let rest_results = results.split_off(m);
                let rest_weights = weights.as_mut().map(|w| w.split_off(m));
                batch.arms.extend(arms);
                batch.results.extend(results);
                match weights {
                    Some(w) => batch.weights.extend(w),
                    None => batch.weights.extend(std::iter::repeat(1.0).take(m)),
                }
                if rest_arms.is_empty() {
                    None
                } else {
                    Some(UpdateEvent::Batch {
                        arms: rest_arms,
                        results: rest_results,
                        weights: rest_weights,
                    })
                }
            }
        }
    }
}

/// Parallel arrays ready for one `update_all` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<A> {
    pub arms: Vec<A>,
    pub results: Vec<f64>,
    pub weights: Vec<f64>,
}

impl<A> Batch<A> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arms: Vec::with_capacity(capacity),
            results: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, arm: A, result: f64, weight: f64) {
        self.arms.push(arm);
        self.results.push(result);
        self.weights.push(weight);
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }
}

impl<A> Default for Batch<A> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

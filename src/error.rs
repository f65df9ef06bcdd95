//! Error types for bandit construction, selection and updates.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BanditError>;

/// Errors surfaced by bandits, parallel wrappers and their configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BanditError {
    /// A bandit was constructed (or restructured) with zero arms.
    #[error("bandit requires at least one arm")]
    NoArms,

    /// A parallel wrapper was configured with zero replicas.
    #[error("parallel bandit requires at least one replica")]
    NoReplicas,

    /// The batch size range is empty or has a zero upper bound.
    #[error("invalid batch size range {lower}..={upper}")]
    InvalidBatchSize { lower: usize, upper: usize },

    /// A policy or estimator hyper-parameter is out of its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No arm satisfies the assumptions of this selection.
    #[error("unsatisfiable selection: {0}")]
    Unsatisfiable(String),

    /// Parallel arrays passed to `update_all` differ in length.
    #[error("arrays must be same length (arms={arms}, results={results}, weights={weights:?})")]
    LengthMismatch {
        arms: usize,
        results: usize,
        weights: Option<usize>,
    },

    /// An arm index is outside of `0..arms`.
    #[error("arm index {arm} out of range for {arms} arms")]
    ArmOutOfRange { arm: usize, arms: usize },

    /// Imported data does not line up with the live arm set.
    #[error("inconsistent import length: expected {expected}, got {actual}")]
    ImportLength { expected: usize, actual: usize },
}

/// Failure reported by a [`CandidateSource`](crate::CandidateSource).
///
/// Timeouts and solver failures both land here; the bandit maps them to
/// [`BanditError::Unsatisfiable`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CandidateError {
    #[error("no candidate satisfies the assumptions")]
    Unsatisfiable,

    #[error("candidate generation timed out")]
    Timeout,

    #[error("candidate generation failed: {0}")]
    Failed(String),
}

impl From<CandidateError> for BanditError {
    fn from(e: CandidateError) -> Self {
        BanditError::Unsatisfiable(e.to_string())
    }
}

/// Validate parallel update arrays, returning their common length.
pub(crate) fn check_lengths(arms: usize, results: usize, weights: Option<usize>) -> Result<usize> {
    if arms != results || weights.is_some_and(|w| w != results) {
        return Err(BanditError::LengthMismatch {
            arms,
            results,
            weights,
        });
    }
    Ok(arms)
}

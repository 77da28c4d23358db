//! Error taxonomy for randomization, MCPA and permutation testing.
//!
//! Singular regressions are deliberately absent: they are an expected
//! per-node outcome (see [`crate::mcpa::BlockOutcome`]) and never abort a run.

use metacomm_matrix::MatrixError;
use thiserror::Error;

/// Errors raised by the statistics engine.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Malformed or mutually incompatible input matrices. Fatal.
    #[error("Input shape error: {0}")]
    InputShape(String),

    /// A constraint-preserving randomization ran out of attempts.
    ///
    /// Recoverable by retrying with another seed or another algorithm.
    #[error("{algorithm} randomization exhausted after {attempts} attempts: {detail}")]
    RandomizationExhausted {
        algorithm: &'static str,
        attempts: usize,
        detail: String,
    },

    /// A permutation replicate failed; the whole batch is void.
    #[error("Permutation replicate {replicate} failed: {source}")]
    WorkerFailure {
        replicate: usize,
        #[source]
        source: Box<StatsError>,
    },

    /// A configuration value is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

impl StatsError {
    /// True for errors a caller may resolve by retrying with a new seed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RandomizationExhausted { .. })
    }
}

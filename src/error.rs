//! Error types for the clustering engine

use thiserror::Error;

/// Errors raised by the engine before any computation starts.
///
/// Numeric degeneracies (zero-variance columns, empty clusters, single-cluster
/// quality scores) are handled in place and never surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A parameter or input violates a precondition of the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Labels, representatives or feature columns disagree in size.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// What the operation required
        expected: String,
        /// What it was given
        actual: String,
    },
}

impl EngineError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration(msg.into())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Shared validation for the partitioners' `k`.
pub(crate) fn validate_k(k: usize, n_samples: usize) -> EngineResult<()> {
    if n_samples == 0 {
        return Err(EngineError::config("feature matrix is empty"));
    }
    if k < 1 {
        return Err(EngineError::config(format!(
            "number of clusters must be at least 1, got {k}"
        )));
    }
    if k > n_samples {
        return Err(EngineError::config(format!(
            "number of clusters ({k}) exceeds number of samples ({n_samples})"
        )));
    }
    Ok(())
}

//! Error taxonomy for the decision and learning core.

use thiserror::Error;

/// Errors raised by the decision and learning core.
///
/// Only `MissingData` on the entry price and `InvariantViolation` ever reach
/// callers as hard failures. Insufficient samples and degenerate inputs are
/// normally absorbed into a no-op outcome; the variants exist so that the
/// reason can be carried and printed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A required price input is absent or unusable.
    #[error("missing data: {0}")]
    MissingData(String),

    /// Adaptation requested with fewer samples than configured.
    #[error("insufficient sample: {have} evaluated decisions, need {need}")]
    InsufficientSample { have: u64, need: u64 },

    /// Input that carries no usable information (zero ATR, equal accuracies).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// A caller tried to break a data-model invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(violation = %msg, "Rejected mutation");
        Self::InvariantViolation(msg)
    }
}

//! Cross-cutting error taxonomy.
//!
//! Every crate keeps its own `thiserror` error type for its public surface;
//! this module only defines the shared *classification* those types map
//! into at the boundary, so retry/backoff/failure policy can be written
//! once against `ErrorKind` instead of being re-derived per crate.

use serde::{Deserialize, Serialize};

/// The flat error taxonomy from the error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Timeouts, resets, 5xx from any external dependency. Retried locally
    /// with backoff, then at the queue level.
    NetTransient,
    /// Non-2xx with permanent semantics (4xx except 429). Not retried.
    UpstreamError,
    /// An LLM response could not be parsed into the expected shape.
    DecodingError,
    /// A token/cost budget was exceeded.
    BudgetExceeded,
    /// A soft deadline was hit.
    Timeout,
    /// The current FSM state forbids the requested action.
    StateConflict,
    /// A data-model invariant was violated.
    ValidationError,
    /// A precondition (an upstream stage's output) was not met.
    DependencyMissing,
}

impl ErrorKind {
    /// Whether this kind is retried at the call site that raised it,
    /// as opposed to only at the queue level (or not at all).
    pub fn is_locally_retryable(self) -> bool {
        matches!(self, ErrorKind::NetTransient | ErrorKind::DecodingError)
    }

    /// Whether the queue should requeue a job that failed with this kind,
    /// independent of any local retry already attempted.
    pub fn is_queue_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::NetTransient | ErrorKind::Timeout | ErrorKind::DependencyMissing
        )
    }
}

/// Implemented by every crate's error enum to classify its variants into
/// the shared taxonomy without collapsing them into one type.
pub trait ErrorKindExt {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_transient_is_retryable_both_ways() {
        assert!(ErrorKind::NetTransient.is_locally_retryable());
        assert!(ErrorKind::NetTransient.is_queue_retryable());
    }

    #[test]
    fn validation_error_is_never_retryable() {
        assert!(!ErrorKind::ValidationError.is_locally_retryable());
        assert!(!ErrorKind::ValidationError.is_queue_retryable());
    }

    #[test]
    fn decoding_error_is_locally_but_not_queue_retryable() {
        assert!(ErrorKind::DecodingError.is_locally_retryable());
        assert!(!ErrorKind::DecodingError.is_queue_retryable());
    }
}

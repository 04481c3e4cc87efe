use perceiver_structural::PerceiverError;
use thiserror::Error;

use crate::agent_loop::types::TerminationReason;

/// Failure of the decision engine to produce a usable batch.
///
/// Always a step failure: the loop records it and asks again next step
/// until the failure budget runs out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    /// The engine itself failed (transport error, provider refusal, ...).
    #[error("decision engine failed: {0}")]
    Failed(String),

    /// Output could not be read as a list of action requests.
    #[error("malformed decision output: {0}")]
    Malformed(String),

    #[error("decision engine returned no actions")]
    Empty,

    #[error("decision timed out after {0} ms")]
    Timeout(u64),
}

impl DecisionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Whether asking again with the same input can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DecisionError::Failed(_) | DecisionError::Timeout(_))
    }
}

/// Misuse of the loop itself, as opposed to a failed step.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("invalid loop config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Indexer(#[from] PerceiverError),

    #[error("loop already finished: {0}")]
    Finished(TerminationReason),

    #[error("loop has not reached a terminal state")]
    NotFinished,
}

impl LoopError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(DecisionError::failed("503").is_retryable());
        assert!(DecisionError::Timeout(60_000).is_retryable());
        assert!(!DecisionError::Empty.is_retryable());
        assert!(!DecisionError::malformed("not json").is_retryable());
    }

    #[test]
    fn finished_error_names_the_reason() {
        let err = LoopError::Finished(TerminationReason::Cancelled);
        assert_eq!(err.to_string(), "loop already finished: stopped by external request");
    }
}

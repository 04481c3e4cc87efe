use thiserror::Error;

/// Failure to snapshot a live page. Reported to the agent loop, which counts
/// it against the failure budget and tries again next step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObservationError {
    #[error("page unreachable: {0}")]
    Unreachable(String),
    #[error("page is navigating: {0}")]
    Navigating(String),
    #[error("page closed")]
    Closed,
    #[error("capture timed out after {0} ms")]
    Timeout(u64),
    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

impl ObservationError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Whether waiting briefly and capturing again can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ObservationError::Navigating(_)
                | ObservationError::Timeout(_)
                | ObservationError::Unreachable(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PerceiverError {
    #[error("invalid indexer config: {0}")]
    InvalidConfig(String),
}

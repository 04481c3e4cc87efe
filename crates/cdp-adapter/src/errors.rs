use std::fmt;

use action_primitives::ActionError;
use chromiumoxide::error::CdpError;
use perceiver_structural::ObservationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// High-level error categories surfaced by the adapter.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("navigation in progress")]
    Navigating,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("target closed")]
    TargetClosed,
    #[error("target element not found")]
    TargetNotFound,
    #[error("frame detached")]
    FrameDetached,
    #[error("element not interactable")]
    NotInteractable,
    #[error("element disabled")]
    Disabled,
    #[error("option not found")]
    OptionNotFound,
    #[error("scroll target invalid")]
    NotScrollable,
    #[error("tab not found")]
    TabNotFound,
    #[error("script returned malformed data")]
    Malformed,
    #[error("deadline exceeded")]
    Deadline,
    #[error("cancelled")]
    Cancelled,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: matches!(
                kind,
                AdapterErrorKind::Navigating | AdapterErrorKind::CdpIo | AdapterErrorKind::NavTimeout
            ),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    fn detail(&self) -> String {
        self.hint.clone().unwrap_or_else(|| self.kind.to_string())
    }
}

impl From<CdpError> for AdapterError {
    fn from(err: CdpError) -> Self {
        let message = err.to_string();
        let kind = classify_protocol_message(&message);
        AdapterError::new(kind).with_hint(message)
    }
}

/// Buckets a DevTools failure message. Chromium reports context loss during
/// navigation and closed targets only through message text.
pub(crate) fn classify_protocol_message(message: &str) -> AdapterErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("execution context was destroyed")
        || lower.contains("cannot find context with specified id")
        || lower.contains("inspected target navigated")
    {
        AdapterErrorKind::Navigating
    } else if lower.contains("target closed")
        || lower.contains("no target with given id")
        || lower.contains("session closed")
        || lower.contains("channel closed")
    {
        AdapterErrorKind::TargetClosed
    } else if lower.contains("timeout") || lower.contains("timed out") {
        AdapterErrorKind::NavTimeout
    } else {
        AdapterErrorKind::CdpIo
    }
}

impl From<AdapterError> for ObservationError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::Navigating => ObservationError::Navigating(err.detail()),
            AdapterErrorKind::TargetClosed => ObservationError::Closed,
            AdapterErrorKind::Malformed => ObservationError::Malformed(err.detail()),
            _ => ObservationError::Unreachable(err.to_string()),
        }
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let detail = err.detail();
        match err.kind {
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(detail),
            AdapterErrorKind::Deadline => ActionError::WaitTimeout(detail),
            AdapterErrorKind::Cancelled => ActionError::Interrupted(detail),
            AdapterErrorKind::TargetNotFound => ActionError::ElementNotFound(detail),
            AdapterErrorKind::FrameDetached | AdapterErrorKind::Navigating => {
                ActionError::FrameDetached(detail)
            }
            AdapterErrorKind::NotInteractable => ActionError::NotClickable(detail),
            AdapterErrorKind::Disabled => ActionError::NotEnabled(detail),
            AdapterErrorKind::OptionNotFound => ActionError::OptionNotFound(detail),
            AdapterErrorKind::NotScrollable => ActionError::ScrollTargetInvalid(detail),
            AdapterErrorKind::TabNotFound => ActionError::TabNotFound(detail),
            AdapterErrorKind::CdpIo | AdapterErrorKind::TargetClosed => ActionError::CdpIo(detail),
            AdapterErrorKind::Malformed | AdapterErrorKind::Internal => {
                ActionError::Internal(detail)
            }
        }
    }
}

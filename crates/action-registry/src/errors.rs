use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::FieldIssue;

/// Startup-time configuration errors. These are fatal; the registry is
/// built once, before any loop runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("action `{0}` is already registered")]
    DuplicateAction(String),
    #[error("action `{name}` is malformed: {reason}")]
    InvalidSpec { name: String, reason: String },
}

/// Why a dispatched request did not produce a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownAction,
    InvalidParameters,
    StaleElement,
    HandlerExecution,
    Timeout,
    Cancelled,
}

impl FailureKind {
    /// The request did not fit the observed page; asking again with a
    /// corrected request can succeed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FailureKind::UnknownAction | FailureKind::InvalidParameters | FailureKind::StaleElement
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("unknown action `{name}`; available: {}", available.join(", "))]
    UnknownAction { name: String, available: Vec<String> },

    #[error("invalid parameters for `{action}`: {}", render_issues(issues))]
    InvalidParameters {
        action: String,
        issues: Vec<FieldIssue>,
    },

    #[error("element index {index} does not exist on the current page")]
    StaleElement { action: String, index: u32 },

    #[error("`{action}` failed: {message}")]
    HandlerExecution { action: String, message: String },

    #[error("`{action}` timed out after {timeout_ms} ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("`{action}` cancelled")]
    Cancelled { action: String },
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::UnknownAction { .. } => FailureKind::UnknownAction,
            DispatchError::InvalidParameters { .. } => FailureKind::InvalidParameters,
            DispatchError::StaleElement { .. } => FailureKind::StaleElement,
            DispatchError::HandlerExecution { .. } => FailureKind::HandlerExecution,
            DispatchError::Timeout { .. } => FailureKind::Timeout,
            DispatchError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            DispatchError::UnknownAction { name, .. } => name,
            DispatchError::InvalidParameters { action, .. }
            | DispatchError::StaleElement { action, .. }
            | DispatchError::HandlerExecution { action, .. }
            | DispatchError::Timeout { action, .. }
            | DispatchError::Cancelled { action } => action,
        }
    }
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_actions() {
        let stale = DispatchError::StaleElement {
            action: "click".into(),
            index: 7,
        };
        assert_eq!(stale.kind(), FailureKind::StaleElement);
        assert!(stale.kind().is_validation());
        assert_eq!(stale.action(), "click");
        assert_eq!(
            stale.to_string(),
            "element index 7 does not exist on the current page"
        );

        let timeout = DispatchError::Timeout {
            action: "wait".into(),
            timeout_ms: 500,
        };
        assert!(!timeout.kind().is_validation());
    }

    #[test]
    fn unknown_action_lists_alternatives() {
        let err = DispatchError::UnknownAction {
            name: "teleport".into(),
            available: vec!["click".into(), "done".into()],
        };
        assert_eq!(err.action(), "teleport");
        assert_eq!(
            err.to_string(),
            "unknown action `teleport`; available: click, done"
        );
    }

    #[test]
    fn failure_kind_is_snake_case() {
        assert_eq!(
            serde_json::to_value(FailureKind::HandlerExecution).unwrap(),
            serde_json::json!("handler_execution")
        );
    }
}

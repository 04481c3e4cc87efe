use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DispatchError, FailureKind};
use crate::spec::ActionOutcome;

/// Untrusted intent to invoke one action, as produced by a decision engine:
/// `{"action": "click", "params": {"index": 3}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    /// Element index named by the payload, if any. Only meaningful for
    /// logging; dispatch resolves indices through the schema.
    pub fn index_hint(&self) -> Option<u64> {
        self.params.get("index").and_then(Value::as_u64)
    }
}

/// Outcome of dispatching one request. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub success: bool,
    /// Human-readable outcome on success, error description on failure.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Value>,
    pub is_done: bool,
    /// Task verdict reported by a terminal action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_success: Option<bool>,
    pub page_changed: bool,
    pub latency_ms: u64,
}

impl ActionResult {
    pub(crate) fn succeeded(
        action: &str,
        outcome: ActionOutcome,
        page_changed: bool,
        latency_ms: u64,
    ) -> Self {
        let message = outcome
            .message
            .unwrap_or_else(|| format!("`{}` completed", action));
        Self {
            action: action.to_string(),
            success: true,
            message,
            failure: None,
            extracted: outcome.extracted,
            is_done: outcome.done.is_some(),
            task_success: outcome.done,
            page_changed,
            latency_ms,
        }
    }

    pub(crate) fn failed(error: &DispatchError, latency_ms: u64) -> Self {
        Self {
            action: error.action().to_string(),
            success: false,
            message: error.to_string(),
            failure: Some(error.kind()),
            extracted: None,
            is_done: false,
            task_success: None,
            page_changed: false,
            latency_ms,
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }
}

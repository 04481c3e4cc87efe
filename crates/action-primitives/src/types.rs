//! Core data types for action primitives

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use perceiver_structural::{ElementLocator, IndexedElement};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use webpilot_core_types::{ActionId, FrameTag, Rect};

use crate::errors::ActionError;

/// Execution context for one action
///
/// Carries the deadline and cancellation token that every primitive checks
/// before touching the page, plus an id for log correlation.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Unique identifier for this action
    pub action_id: ActionId,

    /// Deadline for this operation
    pub deadline: Instant,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,
}

impl ExecCtx {
    pub fn new(timeout: Duration, cancel_token: CancellationToken) -> Self {
        Self {
            action_id: ActionId::new(),
            deadline: Instant::now() + timeout,
            cancel_token,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Zero once the deadline has passed.
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fail fast when cancelled or out of time.
    pub fn ensure_live(&self) -> Result<(), ActionError> {
        if self.is_cancelled() {
            return Err(ActionError::Interrupted("cancelled before completion".to_string()));
        }
        if self.is_timeout() {
            return Err(ActionError::WaitTimeout(
                format!("action {} ran out of time", self.action_id),
            ));
        }
        Ok(())
    }
}

/// Built-in waiting after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitTier {
    /// No built-in waiting
    None,

    /// Wait for the load event
    #[default]
    DomReady,

    /// Load event plus a quiet period for late network activity
    Idle,
}

/// Resolved element an action operates on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementTarget {
    pub index: u32,
    pub tag: String,
    pub frame: FrameTag,
    pub locator: ElementLocator,
    pub bounds: Option<Rect>,
}

impl From<&IndexedElement> for ElementTarget {
    fn from(element: &IndexedElement) -> Self {
        Self {
            index: element.index,
            tag: element.tag.clone(),
            frame: element.frame.clone(),
            locator: element.locator.clone(),
            bounds: element.bounds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Scroll the page, or a scrollable element when `target` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollRequest {
    pub direction: ScrollDirection,
    /// Pixels; `None` scrolls one viewport height.
    pub amount: Option<u32>,
    pub target: Option<ElementTarget>,
}

/// Outcome of a successful primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub action_id: ActionId,
    pub primitive: String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// URL of the active page afterwards.
    pub url_after: Option<String>,
    /// True when the active document changed (navigation, tab switch).
    pub navigated: bool,
}

impl ActionReport {
    /// Start timing a primitive; call [`ActionReport::finish`] when done.
    pub fn begin(ctx: &ExecCtx, primitive: &str) -> (Self, Instant) {
        let report = Self {
            action_id: ctx.action_id.clone(),
            primitive: primitive.to_string(),
            started_at: Utc::now(),
            latency_ms: 0,
            url_after: None,
            navigated: false,
        };
        (report, Instant::now())
    }

    pub fn finish(mut self, started: Instant, url_after: Option<String>, navigated: bool) -> Self {
        self.latency_ms = started.elapsed().as_millis() as u64;
        self.url_after = url_after;
        self.navigated = navigated;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_context_is_not_live() {
        let token = CancellationToken::new();
        let ctx = ExecCtx::new(Duration::from_secs(5), token.clone());
        assert!(ctx.ensure_live().is_ok());
        token.cancel();
        assert!(matches!(ctx.ensure_live(), Err(ActionError::Interrupted(_))));
    }

    #[test]
    fn expired_context_reports_timeout() {
        let ctx = ExecCtx::new(Duration::ZERO, CancellationToken::new());
        assert!(matches!(ctx.ensure_live(), Err(ActionError::WaitTimeout(_))));
        assert_eq!(ctx.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn report_records_navigation() {
        let ctx = ExecCtx::new(Duration::from_secs(1), CancellationToken::new());
        let (report, started) = ActionReport::begin(&ctx, "navigate");
        let report = report.finish(started, Some("https://a.test/".into()), true);
        assert!(report.navigated);
        assert_eq!(report.primitive, "navigate");
        assert_eq!(report.action_id, ctx.action_id);
    }
}

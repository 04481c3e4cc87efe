//! State, history and run result of the agent loop.

use std::fmt;

use action_registry::{ActionRequest, ActionResult};
use chrono::{DateTime, Utc};
use perceiver_structural::Observation;
use serde::{Deserialize, Serialize};

/// Lifecycle of a loop. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Running,
    /// An action signalled completion, successful or not.
    Done,
    /// A budget ran out or the loop was stopped from outside.
    Aborted,
}

impl LoopStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LoopStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    Completed { success: bool, text: String },
    FailureBudgetExceeded { consecutive_failures: u32 },
    StepBudgetExceeded { steps: u32 },
    Cancelled,
}

impl TerminationReason {
    pub fn status(&self) -> LoopStatus {
        match self {
            TerminationReason::Completed { .. } => LoopStatus::Done,
            _ => LoopStatus::Aborted,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationReason::Completed { .. } => "task completed",
            TerminationReason::FailureBudgetExceeded { .. } => "failure budget exceeded",
            TerminationReason::StepBudgetExceeded { .. } => "step budget exhausted",
            TerminationReason::Cancelled => "stopped by external request",
        })
    }
}

/// Counters the loop updates exactly once per step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub step: u32,
    pub consecutive_failures: u32,
    pub total_failures: u32,
    pub status: LoopStatus,
    pub reason: Option<TerminationReason>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            step: 0,
            consecutive_failures: 0,
            total_failures: 0,
            status: LoopStatus::Running,
            reason: None,
        }
    }
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            self.total_failures += 1;
        }
    }

    pub(crate) fn terminate(&mut self, reason: TerminationReason) {
        self.status = reason.status();
        self.reason = Some(reason);
    }
}

/// Why a step did not fully succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "detail", rename_all = "snake_case")]
pub enum StepFailure {
    /// The page could not be captured; the engine was not consulted.
    Observation(String),
    Decision(String),
    /// First failed result of the batch.
    Action { action: String, message: String },
    Cancelled,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFailure::Observation(detail) => write!(f, "observation failed: {detail}"),
            StepFailure::Decision(detail) => write!(f, "decision failed: {detail}"),
            StepFailure::Action { action, message } => write!(f, "`{action}` failed: {message}"),
            StepFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Record of one step.
///
/// `requests` holds what was dispatched, in order, paired with `results`;
/// requests the batch never reached are kept in `skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHistoryEntry {
    pub step: u32,
    pub started_at: DateTime<Utc>,
    /// Absent when capture failed. Stored without its screenshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    #[serde(default)]
    pub requests: Vec<ActionRequest>,
    #[serde(default)]
    pub results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<ActionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl AgentHistoryEntry {
    pub(crate) fn begin(step: u32) -> Self {
        Self {
            step,
            started_at: Utc::now(),
            observation: None,
            requests: Vec::new(),
            results: Vec::new(),
            skipped: Vec::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The terminal result of this step, if an action signalled completion.
    pub fn done_result(&self) -> Option<&ActionResult> {
        self.results.iter().find(|result| result.is_done)
    }

    /// One-line summary, e.g. `#2 https://a.test/ click, input_text ok`.
    pub fn summary(&self) -> String {
        let url = self
            .observation
            .as_ref()
            .map(|obs| obs.url.as_str())
            .unwrap_or("<no observation>");
        let actions = self
            .requests
            .iter()
            .map(|request| request.action.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let outcome = match &self.failure {
            Some(failure) => failure.to_string(),
            None => "ok".to_string(),
        };
        if actions.is_empty() {
            format!("#{} {} {}", self.step, url, outcome)
        } else {
            format!("#{} {} {} {}", self.step, url, actions, outcome)
        }
    }
}

/// Append-only sequence of step records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentHistory(Vec<AgentHistoryEntry>);

impl AgentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: AgentHistoryEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[AgentHistoryEntry] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentHistoryEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AgentHistoryEntry> {
        self.0.last()
    }

    /// Every dispatched request with its result, across all steps.
    pub fn actions(&self) -> impl Iterator<Item = (u32, &ActionRequest, &ActionResult)> {
        self.0.iter().flat_map(|entry| {
            entry
                .requests
                .iter()
                .zip(entry.results.iter())
                .map(move |(request, result)| (entry.step, request, result))
        })
    }

    pub fn into_entries(self) -> Vec<AgentHistoryEntry> {
        self.0
    }
}

impl<'a> IntoIterator for &'a AgentHistory {
    type Item = &'a AgentHistoryEntry;
    type IntoIter = std::slice::Iter<'a, AgentHistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Outcome of a finished loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub status: LoopStatus,
    pub reason: TerminationReason,
    /// Verdict of the `done` action; false for every aborted run.
    pub success: bool,
    pub final_text: Option<String>,
    pub steps: u32,
    pub history: AgentHistory,
    pub elapsed_ms: u64,
}

impl AgentRunResult {
    pub fn is_success(&self) -> bool {
        self.status == LoopStatus::Done && self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn termination_reasons_render_for_people() {
        let completed = TerminationReason::Completed {
            success: false,
            text: "gave up".into(),
        };
        assert_eq!(completed.to_string(), "task completed");
        assert_eq!(completed.status(), LoopStatus::Done);
        assert_eq!(
            TerminationReason::FailureBudgetExceeded {
                consecutive_failures: 3
            }
            .to_string(),
            "failure budget exceeded"
        );
        assert_eq!(
            TerminationReason::StepBudgetExceeded { steps: 10 }.to_string(),
            "step budget exhausted"
        );
        assert_eq!(TerminationReason::Cancelled.status(), LoopStatus::Aborted);
    }

    #[test]
    fn state_counts_failures() {
        let mut state = AgentState::default();
        state.record(false);
        state.record(false);
        assert_eq!(state.consecutive_failures, 2);
        state.record(true);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_failures, 2);
        assert!(!state.is_terminal());

        state.terminate(TerminationReason::Cancelled);
        assert!(state.is_terminal());
        assert_eq!(state.status, LoopStatus::Aborted);
    }

    #[test]
    fn failed_capture_entry_summarizes() {
        let mut entry = AgentHistoryEntry::begin(4);
        entry.failure = Some(StepFailure::Observation("page closed".into()));
        assert!(!entry.is_success());
        assert_eq!(
            entry.summary(),
            "#4 <no observation> observation failed: page closed"
        );
    }

    #[test]
    fn history_serializes_as_a_list() {
        let mut history = AgentHistory::new();
        let mut entry = AgentHistoryEntry::begin(1);
        entry.failure = Some(StepFailure::Decision("decision engine returned no actions".into()));
        history.push(entry);

        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(value[0]["step"], 1);
        assert_eq!(
            value[0]["failure"],
            json!({"stage": "decision", "detail": "decision engine returned no actions"})
        );
        let back: AgentHistory = serde_json::from_value(value).unwrap();
        assert_eq!(back, history);
    }
}

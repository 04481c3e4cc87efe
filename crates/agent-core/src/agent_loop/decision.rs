//! The decision engine port.

use action_registry::{ActionDescriptor, ActionRequest};
use async_trait::async_trait;
use perceiver_structural::Observation;
use serde::Deserialize;
use serde_json::Value;

use crate::agent_loop::types::AgentHistory;
use crate::errors::DecisionError;

/// Everything an engine sees when choosing the next batch.
#[derive(Debug, Clone)]
pub struct DecisionInput<'a> {
    pub task: &'a str,
    pub step: u32,
    pub history: &'a AgentHistory,
    pub observation: &'a Observation,
    /// Actions applicable to this observation, in registration order.
    pub available_actions: Vec<ActionDescriptor>,
}

impl DecisionInput<'_> {
    /// Prompt rendering of the available actions, one block each.
    pub fn actions_prompt(&self) -> String {
        self.available_actions
            .iter()
            .map(ActionDescriptor::prompt_block)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// External policy choosing what to do next.
///
/// Requests are untrusted: the registry validates each one against the
/// observation in the same input, so an engine may return anything it
/// likes and failures come back through the history.
#[async_trait]
pub trait DecisionEngine: Send {
    async fn decide(
        &mut self,
        input: DecisionInput<'_>,
    ) -> Result<Vec<ActionRequest>, DecisionError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDecision {
    Batch(Vec<ActionRequest>),
    Wrapped { actions: Vec<ActionRequest> },
    Single(ActionRequest),
}

/// Reads action requests out of model text.
///
/// Accepts a bare array, an object with an `actions` array, or a single
/// request, optionally inside a fenced code block.
pub fn parse_requests(text: &str) -> Result<Vec<ActionRequest>, DecisionError> {
    let body = strip_fence(text.trim());
    if body.is_empty() {
        return Err(DecisionError::Empty);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|err| DecisionError::malformed(err.to_string()))?;
    let requests = match serde_json::from_value::<RawDecision>(value) {
        Ok(RawDecision::Batch(requests)) | Ok(RawDecision::Wrapped { actions: requests }) => {
            requests
        }
        Ok(RawDecision::Single(request)) => vec![request],
        Err(_) => {
            return Err(DecisionError::malformed(
                "expected a request, a list of requests, or {\"actions\": [...]}",
            ))
        }
    };
    if requests.is_empty() {
        return Err(DecisionError::Empty);
    }
    Ok(requests)
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

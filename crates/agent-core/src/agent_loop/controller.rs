//! Agent loop controller: the observe, decide, act state machine.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use action_registry::{ActionRegistry, ActionRequest, DispatchOptions};
use futures::FutureExt;
use perceiver_structural::{DomIndexer, Observation, Sampler, SelectorMap};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::config::AgentLoopConfig;
use super::decision::{DecisionEngine, DecisionInput};
use super::types::{
    AgentHistory, AgentHistoryEntry, AgentRunResult, AgentState, LoopStatus, StepFailure,
    TerminationReason,
};
use super::BrowserPage;
use crate::errors::{DecisionError, LoopError};

/// Drives one page toward a task.
///
/// The loop borrows its page mutably for its whole life, so no other driver
/// can act on the page while it runs. Steps are strictly sequential and the
/// requests of one batch run in the order the engine returned them.
pub struct AgentLoop<'p, P, E>
where
    P: BrowserPage,
    E: DecisionEngine,
{
    task: String,
    page: &'p mut P,
    registry: Arc<ActionRegistry>,
    engine: E,
    config: AgentLoopConfig,
    sampler: Sampler,
    indexer: DomIndexer,
    cancel: CancellationToken,
    state: AgentState,
    history: AgentHistory,
    previous_map: Option<SelectorMap>,
    started: Option<Instant>,
}

impl<'p, P, E> AgentLoop<'p, P, E>
where
    P: BrowserPage,
    E: DecisionEngine,
{
    pub fn new(
        task: impl Into<String>,
        page: &'p mut P,
        registry: Arc<ActionRegistry>,
        engine: E,
        config: AgentLoopConfig,
    ) -> Result<Self, LoopError> {
        config.validate()?;
        Ok(Self {
            task: task.into(),
            page,
            registry,
            engine,
            sampler: Sampler::new(config.sampler.clone()),
            indexer: DomIndexer::new(config.indexer.clone()),
            config,
            cancel: CancellationToken::new(),
            state: AgentState::default(),
            history: AgentHistory::new(),
            previous_map: None,
            started: None,
        })
    }

    /// Stop the loop when `token` is cancelled. The stop is seen at the next
    /// step boundary and interrupts whatever the current step is waiting on.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &AgentHistory {
        &self.history
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run exactly one step and return the status it left the loop in.
    pub async fn step(&mut self) -> Result<LoopStatus, LoopError> {
        if let Some(reason) = &self.state.reason {
            return Err(LoopError::Finished(reason.clone()));
        }
        Ok(self.advance().await)
    }

    /// Step until the loop reaches a terminal state.
    pub async fn run(mut self) -> AgentRunResult {
        info!(task = %self.task, max_steps = self.config.max_steps, "agent loop started");
        while !self.state.is_terminal() {
            self.advance().await;
        }
        let result = self.build_result();
        info!(
            status = ?result.status,
            reason = %result.reason,
            steps = result.steps,
            elapsed_ms = result.elapsed_ms,
            "agent loop finished"
        );
        result
    }

    /// The run result of a loop driven with [`AgentLoop::step`].
    pub fn into_result(self) -> Result<AgentRunResult, LoopError> {
        if !self.state.is_terminal() {
            return Err(LoopError::NotFinished);
        }
        Ok(self.build_result())
    }

    fn build_result(self) -> AgentRunResult {
        let reason = self
            .state
            .reason
            .clone()
            .unwrap_or(TerminationReason::Cancelled);
        let (success, final_text) = match &reason {
            TerminationReason::Completed { success, text } => (*success, Some(text.clone())),
            _ => (false, None),
        };
        AgentRunResult {
            status: reason.status(),
            reason,
            success,
            final_text,
            steps: self.state.step,
            history: self.history,
            elapsed_ms: self
                .started
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    async fn advance(&mut self) -> LoopStatus {
        if self.cancel.is_cancelled() {
            info!(step = self.state.step, "stop requested before step");
            self.state.terminate(TerminationReason::Cancelled);
            return self.state.status;
        }
        self.started.get_or_insert_with(Instant::now);

        self.state.step += 1;
        let step = self.state.step;
        let span = info_span!("agent_step", step);
        let entry = self.run_step(step).instrument(span).await;

        let succeeded = entry.is_success();
        self.state.record(succeeded);
        if let Some(failure) = &entry.failure {
            warn!(
                step,
                consecutive_failures = self.state.consecutive_failures,
                failure = %failure,
                "step failed"
            );
        }
        let done = entry
            .done_result()
            .map(|result| (result.task_success.unwrap_or(false), result.message.clone()));
        self.history.push(entry);

        if let Some((success, text)) = done {
            self.state
                .terminate(TerminationReason::Completed { success, text });
        } else if self.cancel.is_cancelled() {
            self.state.terminate(TerminationReason::Cancelled);
        } else if self.state.consecutive_failures >= self.config.max_consecutive_failures {
            self.state.terminate(TerminationReason::FailureBudgetExceeded {
                consecutive_failures: self.state.consecutive_failures,
            });
        } else if step >= self.config.max_steps {
            self.state
                .terminate(TerminationReason::StepBudgetExceeded { steps: step });
        }
        self.state.status
    }

    async fn run_step(&mut self, step: u32) -> AgentHistoryEntry {
        let mut entry = AgentHistoryEntry::begin(step);

        let observation = match self.observe().await {
            Ok(observation) => observation,
            Err(failure) => {
                entry.failure = Some(failure);
                return entry;
            }
        };

        let requests = match self.decide(step, &observation).await {
            Ok(requests) => requests,
            Err(failure) => {
                entry.failure = Some(failure);
                entry.observation = Some(strip_screenshot(observation));
                return entry;
            }
        };

        self.act(&observation, requests, &mut entry).await;
        entry.observation = Some(strip_screenshot(observation));
        entry
    }

    async fn observe(&mut self) -> Result<Observation, StepFailure> {
        let page: &P = self.page;
        let sampled = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StepFailure::Cancelled),
            sampled = self.sampler.sample(page) => sampled,
        };
        let raw = sampled.map_err(|err| StepFailure::Observation(err.to_string()))?;

        let mut observation = self.indexer.index(raw, self.previous_map.as_ref());
        if !self.config.enable_vision {
            observation.screenshot = None;
        }
        info!(
            url = %observation.url,
            elements = observation.selector_map.len(),
            new = observation.new_indices.len(),
            truncated = observation.is_truncated(),
            "page observed"
        );
        self.previous_map = Some(observation.selector_map.clone());
        Ok(observation)
    }

    async fn decide(
        &mut self,
        step: u32,
        observation: &Observation,
    ) -> Result<Vec<ActionRequest>, StepFailure> {
        let input = DecisionInput {
            task: &self.task,
            step,
            history: &self.history,
            observation,
            available_actions: self.registry.describe(observation),
        };
        let limit = self.config.decision_timeout_duration();
        let guarded = AssertUnwindSafe(self.engine.decide(input)).catch_unwind();
        let decided = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StepFailure::Cancelled),
            decided = timeout(limit, guarded) => decided,
        };
        let decided = match decided {
            Err(_) => Err(DecisionError::Timeout(limit.as_millis() as u64)),
            Ok(Err(panic)) => Err(DecisionError::failed(format!(
                "panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Ok(Ok(decided)) => decided,
        };
        let requests = decided
            .and_then(|requests| {
                if requests.is_empty() {
                    Err(DecisionError::Empty)
                } else {
                    Ok(requests)
                }
            })
            .map_err(|err| StepFailure::Decision(err.to_string()))?;
        debug!(
            requests = requests.len(),
            actions = ?requests.iter().map(|r| r.action.as_str()).collect::<Vec<_>>(),
            "decision received"
        );
        Ok(requests)
    }

    async fn act(
        &mut self,
        observation: &Observation,
        requests: Vec<ActionRequest>,
        entry: &mut AgentHistoryEntry,
    ) {
        let options = DispatchOptions::new(
            self.config.action_timeout_duration(),
            self.cancel.child_token(),
        );
        let pause = self.config.wait_between_actions_duration();
        let limit = self.config.max_actions_per_step as usize;
        let page: &P = self.page;

        let mut pending = requests.into_iter();
        while let Some(request) = pending.next() {
            if entry.requests.len() >= limit {
                entry.skipped.push(request);
                entry.skipped.extend(pending.by_ref());
                break;
            }
            if !entry.requests.is_empty() && !pause.is_zero() {
                sleep(pause).await;
            }

            let result = self
                .registry
                .dispatch(&request, observation, page, &options)
                .await;
            let cut = result.is_done || result.is_failure() || result.page_changed;
            if result.is_failure() && entry.failure.is_none() {
                entry.failure = Some(StepFailure::Action {
                    action: result.action.clone(),
                    message: result.message.clone(),
                });
            }
            entry.requests.push(request);
            entry.results.push(result);
            if cut {
                entry.skipped.extend(pending.by_ref());
                break;
            }
        }

        if !entry.skipped.is_empty() {
            debug!(
                dispatched = entry.requests.len(),
                skipped = entry.skipped.len(),
                "batch cut short"
            );
        }
    }
}

fn strip_screenshot(mut observation: Observation) -> Observation {
    observation.screenshot = None;
    observation
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use action_primitives::{
    ActionError, ActionPrimitives, ActionReport, ElementTarget, ExecCtx, ScrollRequest, WaitTier,
};
use action_registry::{ActionRegistry, ActionRequest};
use agent_core::{
    AgentLoop, AgentLoopConfig, DecisionEngine, DecisionError, DecisionInput, LoopError,
    LoopStatus, StepFailure, TerminationReason,
};
use async_trait::async_trait;
use perceiver_structural::{ObservationError, PageObserver, RawNode, RawPageSnapshot};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use webpilot_core_types::{TabId, TabInfo};

const FORM_URL: &str = "https://app.example.com/form";

fn form_page(url: &str, with_input: bool) -> RawPageSnapshot {
    let mut body = RawNode::element("body").bounds(0.0, 0.0, 800.0, 600.0).child(
        RawNode::element("button")
            .bounds(10.0, 10.0, 80.0, 20.0)
            .text("Save"),
    );
    if with_input {
        body = body.child(
            RawNode::element("input")
                .bounds(10.0, 40.0, 200.0, 20.0)
                .attr("name", "q"),
        );
    }
    RawPageSnapshot::new(url, "Form", RawNode::element("html").child(body))
        .with_tabs(vec![TabInfo {
            id: TabId::new("tab-1"),
            url: url.into(),
            title: "Form".into(),
            active: true,
        }])
        .with_screenshot("iVBORw0KGgo=")
}

/// Page whose captures follow a script; the last good capture repeats once
/// the script runs out.
struct ScriptedPage {
    captures: Mutex<VecDeque<Result<RawPageSnapshot, ObservationError>>>,
    current: Mutex<RawPageSnapshot>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPage {
    fn new(captures: Vec<Result<RawPageSnapshot, ObservationError>>) -> Self {
        Self {
            captures: Mutex::new(captures.into()),
            current: Mutex::new(form_page(FORM_URL, true)),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn steady() -> Self {
        Self::new(Vec::new())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn report(ctx: &ExecCtx, name: &str, url: Option<String>, navigated: bool) -> ActionReport {
        let (report, started) = ActionReport::begin(ctx, name);
        report.finish(started, url, navigated)
    }
}

#[async_trait]
impl PageObserver for ScriptedPage {
    async fn capture(&self) -> Result<RawPageSnapshot, ObservationError> {
        let next = self.captures.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.current.lock().unwrap() = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.current.lock().unwrap().clone()),
        }
    }
}

#[async_trait]
impl ActionPrimitives for ScriptedPage {
    async fn navigate(
        &self,
        ctx: &ExecCtx,
        url: &str,
        _wait: WaitTier,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("navigate:{url}"));
        Ok(Self::report(ctx, "navigate", Some(url.to_string()), true))
    }

    async fn go_back(&self, ctx: &ExecCtx) -> Result<ActionReport, ActionError> {
        self.record("go_back".into());
        Ok(Self::report(ctx, "go_back", None, true))
    }

    async fn click(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("click:{}", target.index));
        Ok(Self::report(ctx, "click", Some(FORM_URL.into()), false))
    }

    async fn type_text(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
        text: &str,
        _clear: bool,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("type:{}:{}", target.index, text));
        Ok(Self::report(ctx, "type_text", Some(FORM_URL.into()), false))
    }

    async fn select_option(
        &self,
        ctx: &ExecCtx,
        target: &ElementTarget,
        value: &str,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("select:{}:{}", target.index, value));
        Ok(Self::report(ctx, "select_option", None, false))
    }

    async fn scroll(
        &self,
        ctx: &ExecCtx,
        request: &ScrollRequest,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("scroll:{:?}", request.direction));
        Ok(Self::report(ctx, "scroll", None, false))
    }

    async fn send_keys(&self, ctx: &ExecCtx, keys: &str) -> Result<ActionReport, ActionError> {
        self.record(format!("keys:{keys}"));
        Ok(Self::report(ctx, "send_keys", None, false))
    }

    async fn switch_tab(&self, ctx: &ExecCtx, tab: &TabId) -> Result<ActionReport, ActionError> {
        self.record(format!("switch:{tab}"));
        Ok(Self::report(ctx, "switch_tab", None, true))
    }

    async fn open_tab(&self, ctx: &ExecCtx, url: &str) -> Result<ActionReport, ActionError> {
        self.record(format!("open:{url}"));
        Ok(Self::report(ctx, "open_tab", Some(url.to_string()), true))
    }

    async fn close_tab(&self, ctx: &ExecCtx, tab: &TabId) -> Result<ActionReport, ActionError> {
        self.record(format!("close:{tab}"));
        Ok(Self::report(ctx, "close_tab", None, true))
    }

    async fn extract_text(&self, _ctx: &ExecCtx) -> Result<String, ActionError> {
        Ok("Save".into())
    }

    async fn tabs(&self) -> Result<Vec<TabInfo>, ActionError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    step: u32,
    url: String,
    history_len: usize,
    elements: usize,
    has_screenshot: bool,
    actions: Vec<String>,
    prompt: String,
}

/// Engine replaying canned decisions; `fallback` answers once they run out.
struct ScriptedEngine {
    decisions: VecDeque<Result<Vec<ActionRequest>, DecisionError>>,
    fallback: Option<Vec<ActionRequest>>,
    hang: bool,
    panic_with: Option<&'static str>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl ScriptedEngine {
    fn new(decisions: Vec<Result<Vec<ActionRequest>, DecisionError>>) -> Self {
        Self {
            decisions: decisions.into(),
            fallback: None,
            hang: false,
            panic_with: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn repeating(batch: Vec<ActionRequest>) -> Self {
        let mut engine = Self::new(Vec::new());
        engine.fallback = Some(batch);
        engine
    }

    fn seen(&self) -> Arc<Mutex<Vec<Seen>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl DecisionEngine for ScriptedEngine {
    async fn decide(
        &mut self,
        input: DecisionInput<'_>,
    ) -> Result<Vec<ActionRequest>, DecisionError> {
        self.seen.lock().unwrap().push(Seen {
            step: input.step,
            url: input.observation.url.clone(),
            history_len: input.history.len(),
            elements: input.observation.selector_map.len(),
            has_screenshot: input.observation.screenshot.is_some(),
            actions: input
                .available_actions
                .iter()
                .map(|action| action.name.clone())
                .collect(),
            prompt: input.actions_prompt(),
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(message) = self.panic_with {
            panic!("{message}");
        }
        match self.decisions.pop_front() {
            Some(decision) => decision,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| DecisionError::failed("script exhausted")),
        }
    }
}

fn registry() -> Arc<ActionRegistry> {
    Arc::new(ActionRegistry::with_builtin_actions().unwrap())
}

fn click(index: u32) -> ActionRequest {
    ActionRequest::new("click", json!({ "index": index }))
}

fn done(success: bool, text: &str) -> ActionRequest {
    ActionRequest::new("done", json!({ "success": success, "text": text }))
}

fn scroll_down() -> ActionRequest {
    ActionRequest::new("scroll", json!({ "direction": "down" }))
}

fn config() -> AgentLoopConfig {
    AgentLoopConfig::minimal().actions_per_step(3)
}

#[tokio::test]
async fn done_ends_the_run_and_the_batch() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![Ok(vec![
        click(0),
        done(true, "saved the form"),
        click(0),
    ])]);

    let result = AgentLoop::new("save the form", &mut page, registry(), engine, config())
        .unwrap()
        .run()
        .await;

    assert_eq!(result.status, LoopStatus::Done);
    assert!(result.is_success());
    assert_eq!(result.final_text.as_deref(), Some("saved the form"));
    assert_eq!(result.reason.to_string(), "task completed");
    assert_eq!(result.steps, 1);

    let entry = &result.history.entries()[0];
    assert_eq!(entry.results.len(), 2);
    assert_eq!(entry.skipped, vec![click(0)]);
    assert_eq!(page.calls(), vec!["click:0"]);
}

#[tokio::test]
async fn unsuccessful_done_still_finishes() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![Ok(vec![done(false, "no such product")])]);

    let result = AgentLoop::new("buy a unicorn", &mut page, registry(), engine, config())
        .unwrap()
        .run()
        .await;

    assert_eq!(result.status, LoopStatus::Done);
    assert!(!result.success);
    assert!(!result.is_success());
    assert_eq!(
        result.reason,
        TerminationReason::Completed {
            success: false,
            text: "no such product".into()
        }
    );
}

#[tokio::test]
async fn failed_captures_exhaust_the_failure_budget() {
    let mut page = ScriptedPage::new(vec![
        Err(ObservationError::unreachable("connection refused")),
        Err(ObservationError::unreachable("connection refused")),
    ]);
    let engine = ScriptedEngine::repeating(vec![scroll_down()]);
    let seen = engine.seen();
    let config = config().max_steps(3).failure_budget(2);

    let result = AgentLoop::new("anything", &mut page, registry(), engine, config)
        .unwrap()
        .run()
        .await;

    assert_eq!(result.status, LoopStatus::Aborted);
    assert_eq!(result.reason.to_string(), "failure budget exceeded");
    assert_eq!(result.steps, 2);
    assert_eq!(result.history.len(), 2);
    assert!(seen.lock().unwrap().is_empty());
    for entry in result.history.iter() {
        assert!(entry.observation.is_none());
        assert!(matches!(entry.failure, Some(StepFailure::Observation(_))));
    }
}

#[tokio::test]
async fn every_step_failing_aborts_at_the_step_budget() {
    let mut page = ScriptedPage::new(
        (0..10)
            .map(|_| Err(ObservationError::Closed))
            .collect(),
    );
    let engine = ScriptedEngine::repeating(vec![scroll_down()]);
    let config = config().max_steps(3).failure_budget(10);

    let result = AgentLoop::new("anything", &mut page, registry(), engine, config)
        .unwrap()
        .run()
        .await;

    assert_eq!(result.status, LoopStatus::Aborted);
    assert_eq!(result.reason, TerminationReason::StepBudgetExceeded { steps: 3 });
    assert_eq!(result.history.len(), 3);
}

#[tokio::test]
async fn step_budget_bounds_a_busy_run() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::repeating(vec![scroll_down()]);

    let result = AgentLoop::new(
        "scroll forever",
        &mut page,
        registry(),
        engine,
        config().max_steps(4),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.reason.to_string(), "step budget exhausted");
    assert_eq!(result.steps, 4);
    assert!(result.history.iter().all(|entry| entry.is_success()));
    assert_eq!(page.calls().len(), 4);
}

#[tokio::test]
async fn navigation_cuts_the_rest_of_the_batch() {
    let mut page = ScriptedPage::new(vec![
        Ok(form_page(FORM_URL, true)),
        Ok(form_page("https://app.example.com/next", false)),
    ]);
    let engine = ScriptedEngine::new(vec![
        Ok(vec![
            ActionRequest::new("navigate", json!({"url": "https://app.example.com/next"})),
            click(1),
        ]),
        Ok(vec![done(true, "moved on")]),
    ]);
    let seen = engine.seen();

    let result = AgentLoop::new("go next", &mut page, registry(), engine, config())
        .unwrap()
        .run()
        .await;

    assert!(result.is_success());
    let first = &result.history.entries()[0];
    assert!(first.results[0].page_changed);
    assert_eq!(first.skipped, vec![click(1)]);
    assert!(first.is_success());
    assert_eq!(page.calls(), vec!["navigate:https://app.example.com/next"]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[1].url, "https://app.example.com/next");
    assert_eq!(seen[1].history_len, 1);
}

#[tokio::test]
async fn indices_from_an_earlier_step_are_rejected() {
    let mut page = ScriptedPage::new(vec![
        Ok(form_page(FORM_URL, true)),
        Ok(form_page(FORM_URL, false)),
    ]);
    let engine = ScriptedEngine::new(vec![
        Ok(vec![scroll_down()]),
        Ok(vec![click(1)]),
        Ok(vec![done(true, "ok")]),
    ]);

    let result = AgentLoop::new("click the field", &mut page, registry(), engine, config())
        .unwrap()
        .run()
        .await;

    let second = &result.history.entries()[1];
    assert_eq!(second.observation.as_ref().unwrap().selector_map.len(), 1);
    match &second.failure {
        Some(StepFailure::Action { action, message }) => {
            assert_eq!(action, "click");
            assert!(message.contains("element index 1"), "{message}");
        }
        other => panic!("expected an action failure, got {other:?}"),
    }
    assert!(!page.calls().iter().any(|call| call == "click:1"));
    assert_eq!(result.status, LoopStatus::Done);
}

#[tokio::test]
async fn failed_action_cuts_the_batch_and_counts_as_a_failure() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![
        Ok(vec![
            ActionRequest::new("teleport", json!({})),
            scroll_down(),
        ]),
        Ok(vec![done(true, "ok")]),
    ]);

    let mut agent = AgentLoop::new("t", &mut page, registry(), engine, config()).unwrap();
    assert_eq!(agent.step().await.unwrap(), LoopStatus::Running);
    assert_eq!(agent.state().consecutive_failures, 1);

    let entry = agent.history().last().unwrap();
    assert_eq!(entry.results.len(), 1);
    assert_eq!(entry.skipped, vec![scroll_down()]);

    assert_eq!(agent.step().await.unwrap(), LoopStatus::Done);
    assert_eq!(agent.state().consecutive_failures, 0);
    assert_eq!(agent.state().total_failures, 1);
}

#[tokio::test]
async fn empty_decision_is_a_step_failure() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![Ok(Vec::new()), Ok(vec![done(true, "ok")])]);

    let result = AgentLoop::new("t", &mut page, registry(), engine, config())
        .unwrap()
        .run()
        .await;

    let first = &result.history.entries()[0];
    assert_eq!(
        first.failure,
        Some(StepFailure::Decision(
            "decision engine returned no actions".into()
        ))
    );
    assert!(first.observation.is_some());
    assert!(result.is_success());
    assert_eq!(result.steps, 2);
}

#[tokio::test(start_paused = true)]
async fn requests_past_the_per_step_limit_are_skipped() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![Ok(vec![
        scroll_down(),
        scroll_down(),
        done(true, "ok"),
    ])]);

    let mut agent = AgentLoop::new(
        "t",
        &mut page,
        registry(),
        engine,
        config().actions_per_step(2).wait_between_actions(100),
    )
    .unwrap();
    agent.step().await.unwrap();

    let entry = agent.history().last().unwrap();
    assert_eq!(entry.requests.len(), 2);
    assert_eq!(entry.skipped, vec![done(true, "ok")]);
    assert_eq!(agent.state().status, LoopStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn slow_decisions_time_out() {
    let mut page = ScriptedPage::steady();
    let mut engine = ScriptedEngine::new(Vec::new());
    engine.hang = true;

    let mut agent = AgentLoop::new(
        "t",
        &mut page,
        registry(),
        engine,
        config().decision_timeout(1_000),
    )
    .unwrap();
    agent.step().await.unwrap();

    assert_eq!(
        agent.history().last().unwrap().failure,
        Some(StepFailure::Decision("decision timed out after 1000 ms".into()))
    );
}

#[tokio::test]
async fn panicking_engine_is_a_step_failure() {
    let mut page = ScriptedPage::steady();
    let mut engine = ScriptedEngine::new(Vec::new());
    engine.panic_with = Some("provider client bug");
    let seen = engine.seen();

    let result = AgentLoop::new(
        "t",
        &mut page,
        registry(),
        engine,
        config().max_steps(3).failure_budget(2),
    )
    .unwrap()
    .run()
    .await;

    assert_eq!(result.status, LoopStatus::Aborted);
    assert_eq!(
        result.reason,
        TerminationReason::FailureBudgetExceeded {
            consecutive_failures: 2
        }
    );
    assert_eq!(result.steps, 2);
    assert_eq!(seen.lock().unwrap().len(), 2);
    for entry in result.history.entries() {
        assert_eq!(
            entry.failure,
            Some(StepFailure::Decision(
                "decision engine failed: panicked: provider client bug".into()
            ))
        );
        assert!(entry.observation.is_some());
    }
}

#[tokio::test]
async fn stop_requested_before_the_first_step() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::repeating(vec![scroll_down()]);
    let seen = engine.seen();
    let token = CancellationToken::new();
    token.cancel();

    let result = AgentLoop::new("t", &mut page, registry(), engine, config())
        .unwrap()
        .with_cancel_token(token)
        .run()
        .await;

    assert_eq!(result.status, LoopStatus::Aborted);
    assert_eq!(result.reason.to_string(), "stopped by external request");
    assert_eq!(result.steps, 0);
    assert!(result.history.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_outranks_the_failure_budget() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::repeating(vec![ActionRequest::new(
        "wait",
        json!({"ms": 50_000}),
    )]);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let result = AgentLoop::new(
        "t",
        &mut page,
        registry(),
        engine,
        config().action_timeout(120_000).failure_budget(1),
    )
    .unwrap()
    .with_cancel_token(token)
    .run()
    .await;

    assert_eq!(result.reason, TerminationReason::Cancelled);
    assert_eq!(result.steps, 1);
    assert!(result.history.entries()[0].failure.is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_a_running_action() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::repeating(vec![ActionRequest::new(
        "wait",
        json!({"ms": 50_000}),
    )]);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let result = AgentLoop::new(
        "t",
        &mut page,
        registry(),
        engine,
        config().action_timeout(120_000),
    )
    .unwrap()
    .with_cancel_token(token)
    .run()
    .await;

    assert_eq!(result.reason, TerminationReason::Cancelled);
    assert_eq!(result.steps, 1);
    let entry = &result.history.entries()[0];
    assert!(matches!(
        &entry.failure,
        Some(StepFailure::Action { action, .. }) if action == "wait"
    ));
}

#[tokio::test]
async fn vision_controls_what_the_engine_sees() {
    for vision in [true, false] {
        let mut page = ScriptedPage::steady();
        let engine = ScriptedEngine::new(vec![Ok(vec![done(true, "ok")])]);
        let seen = engine.seen();

        let result = AgentLoop::new(
            "t",
            &mut page,
            registry(),
            engine,
            config().vision(vision),
        )
        .unwrap()
        .run()
        .await;

        assert_eq!(seen.lock().unwrap()[0].has_screenshot, vision);
        let stored = result.history.entries()[0].observation.as_ref().unwrap();
        assert!(stored.screenshot.is_none());
    }
}

#[tokio::test]
async fn engine_is_offered_the_registered_actions() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![Ok(vec![done(true, "ok")])]);
    let seen = engine.seen();

    AgentLoop::new("t", &mut page, registry(), engine, config())
        .unwrap()
        .run()
        .await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].step, 1);
    assert_eq!(seen[0].elements, 2);
    assert_eq!(seen[0].actions.first().map(String::as_str), Some("navigate"));
    assert_eq!(seen[0].actions.last().map(String::as_str), Some("done"));
    assert_eq!(seen[0].actions.len(), 13);
    assert!(seen[0].prompt.contains("• click"), "{}", seen[0].prompt);
    assert!(seen[0].prompt.contains("Required fields: index"));
}

#[tokio::test]
async fn stepping_a_finished_loop_is_an_error() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(vec![Ok(vec![done(true, "ok")])]);

    let mut agent = AgentLoop::new("t", &mut page, registry(), engine, config()).unwrap();
    assert_eq!(agent.step().await.unwrap(), LoopStatus::Done);
    assert!(matches!(
        agent.step().await,
        Err(LoopError::Finished(TerminationReason::Completed { .. }))
    ));
    let result = agent.into_result().unwrap();
    assert_eq!(result.steps, 1);
}

#[tokio::test]
async fn unfinished_loop_has_no_result() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::repeating(vec![scroll_down()]);
    let mut agent = AgentLoop::new("t", &mut page, registry(), engine, config()).unwrap();
    agent.step().await.unwrap();
    assert!(matches!(agent.into_result(), Err(LoopError::NotFinished)));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut page = ScriptedPage::steady();
    let engine = ScriptedEngine::new(Vec::new());
    let err = AgentLoop::new("t", &mut page, registry(), engine, config().max_steps(0));
    assert!(matches!(err, Err(LoopError::InvalidConfig(_))));
}

//! The action catalogue and its dispatch boundary.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use action_primitives::{ActionError, ActionPrimitives, ElementTarget, ExecCtx};
use futures::FutureExt;
use parking_lot::RwLock;
use perceiver_structural::Observation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builtin;
use crate::errors::{DispatchError, RegistryError};
use crate::filter::PageContext;
use crate::result::{ActionRequest, ActionResult};
use crate::spec::{ActionCall, ActionOutcome, ActionSpec};

/// Per-dispatch limits.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl DispatchOptions {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), CancellationToken::new())
    }
}

/// What a decision engine is told about one available action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the accepted parameter object.
    pub parameters: Value,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
}

impl ActionDescriptor {
    fn from_spec(spec: &ActionSpec) -> Self {
        let fields = spec.params().fields();
        Self {
            name: spec.name().to_string(),
            description: spec.description().to_string(),
            parameters: spec.params().json_schema(),
            required_fields: fields
                .iter()
                .filter(|f| f.required)
                .map(|f| f.name.clone())
                .collect(),
            optional_fields: fields
                .iter()
                .filter(|f| !f.required)
                .map(|f| f.name.clone())
                .collect(),
        }
    }

    pub fn prompt_block(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("• {}: {}", self.name, self.description));
        if !self.required_fields.is_empty() {
            lines.push(format!(
                "  Required fields: {}",
                self.required_fields.join(", ")
            ));
        }
        if !self.optional_fields.is_empty() {
            lines.push(format!(
                "  Optional fields: {}",
                self.optional_fields.join(", ")
            ));
        }
        lines.push(format!("  Schema: {}", self.parameters));
        lines.join("\n")
    }
}

/// Registered actions in registration order. Append-only: specs are added
/// at startup and never replaced.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    specs: RwLock<Vec<Arc<ActionSpec>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    /// Registry holding the built-in browser actions.
    pub fn with_builtin_actions() -> Result<Self, RegistryError> {
        let registry = Self::new();
        builtin::register_defaults(&registry)?;
        Ok(registry)
    }

    pub fn register(&self, spec: ActionSpec) -> Result<(), RegistryError> {
        let name = spec.name();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidSpec {
                name: name.to_string(),
                reason: "action names must be non-empty and contain no whitespace".into(),
            });
        }
        let defects = spec.params().defects();
        if !defects.is_empty() {
            return Err(RegistryError::InvalidSpec {
                name: name.to_string(),
                reason: defects.join("; "),
            });
        }

        let mut guard = self.specs.write();
        if guard.iter().any(|existing| existing.name() == name) {
            return Err(RegistryError::DuplicateAction(name.to_string()));
        }
        debug!(action = name, "registered action");
        guard.push(Arc::new(spec));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ActionSpec>> {
        self.specs
            .read()
            .iter()
            .find(|spec| spec.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.specs
            .read()
            .iter()
            .map(|spec| spec.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.specs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.read().is_empty()
    }

    /// Actions whose page filter admits this observation, in registration
    /// order.
    pub fn available_actions(&self, observation: &Observation) -> Vec<Arc<ActionSpec>> {
        let page = PageContext::from(observation);
        self.specs
            .read()
            .iter()
            .filter(|spec| spec.filter().allows(&page))
            .cloned()
            .collect()
    }

    pub fn describe(&self, observation: &Observation) -> Vec<ActionDescriptor> {
        self.available_actions(observation)
            .iter()
            .map(|spec| ActionDescriptor::from_spec(spec))
            .collect()
    }

    pub fn prompt_for(&self, observation: &Observation) -> Option<String> {
        let blocks: Vec<String> = self
            .describe(observation)
            .iter()
            .map(ActionDescriptor::prompt_block)
            .collect();
        if blocks.is_empty() {
            None
        } else {
            Some(blocks.join("\n"))
        }
    }

    /// Validate and run one request against the observation it was decided
    /// on. Never fails and never panics: every problem, including a
    /// panicking handler, becomes a failed [`ActionResult`].
    pub async fn dispatch(
        &self,
        request: &ActionRequest,
        observation: &Observation,
        page: &dyn ActionPrimitives,
        options: &DispatchOptions,
    ) -> ActionResult {
        let started = Instant::now();
        match self.run(request, observation, page, options).await {
            Ok((outcome, page_changed)) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                info!(
                    action = %request.action,
                    latency_ms,
                    page_changed,
                    done = outcome.done.is_some(),
                    "action succeeded"
                );
                ActionResult::succeeded(&request.action, outcome, page_changed, latency_ms)
            }
            Err(error) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                warn!(
                    action = %request.action,
                    index = ?request.index_hint(),
                    kind = ?error.kind(),
                    latency_ms,
                    error = %error,
                    "action failed"
                );
                ActionResult::failed(&error, latency_ms)
            }
        }
    }

    async fn run(
        &self,
        request: &ActionRequest,
        observation: &Observation,
        page: &dyn ActionPrimitives,
        options: &DispatchOptions,
    ) -> Result<(ActionOutcome, bool), DispatchError> {
        let available = self.available_actions(observation);
        let spec = available
            .iter()
            .find(|spec| spec.name() == request.action)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAction {
                name: request.action.clone(),
                available: available.iter().map(|s| s.name().to_string()).collect(),
            })?;
        drop(available);

        let params = spec.params().validate(&request.params).map_err(|issues| {
            DispatchError::InvalidParameters {
                action: spec.name().to_string(),
                issues,
            }
        })?;

        let element = match spec.params().element_field() {
            Some(field) => match params.index(&field.name) {
                Some(index) => {
                    let element = observation.element(index).ok_or_else(|| {
                        DispatchError::StaleElement {
                            action: spec.name().to_string(),
                            index,
                        }
                    })?;
                    Some(ElementTarget::from(element))
                }
                None => None,
            },
            None => None,
        };

        debug!(
            action = spec.name(),
            index = element.as_ref().map(|e| e.index),
            observation = %observation.id,
            "dispatching action"
        );

        let ctx = ExecCtx::new(options.timeout, options.cancel.child_token());
        let call = ActionCall {
            params: &params,
            element: element.as_ref(),
            observation,
            page,
            ctx: &ctx,
        };
        let guarded = std::panic::AssertUnwindSafe(spec.handler().handle(call)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => {
                return Err(DispatchError::Cancelled { action: spec.name().to_string() });
            }
            finished = tokio::time::timeout(options.timeout, guarded) => finished,
        };

        let outcome = match outcome {
            Err(_) => {
                return Err(DispatchError::Timeout {
                    action: spec.name().to_string(),
                    timeout_ms: options.timeout.as_millis() as u64,
                })
            }
            Ok(Err(panic)) => {
                return Err(DispatchError::HandlerExecution {
                    action: spec.name().to_string(),
                    message: format!("handler panicked: {}", panic_message(panic.as_ref())),
                })
            }
            Ok(Ok(Err(ActionError::Interrupted(_)))) => {
                return Err(DispatchError::Cancelled {
                    action: spec.name().to_string(),
                })
            }
            Ok(Ok(Err(error))) => {
                let action = spec.name().to_string();
                return Err(match &element {
                    Some(target) if error.is_stale_target() => DispatchError::StaleElement {
                        action,
                        index: target.index,
                    },
                    _ => DispatchError::HandlerExecution {
                        action,
                        message: error.to_string(),
                    },
                });
            }
            Ok(Ok(Ok(outcome))) => outcome,
        };

        let page_changed = spec.is_page_changing()
            || outcome.report.as_ref().is_some_and(|report| {
                report.navigated
                    || report
                        .url_after
                        .as_deref()
                        .is_some_and(|url| url != observation.url)
            });
        Ok((outcome, page_changed))
    }
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

/// Collects specs and registers them all at once, failing on the first
/// duplicate or malformed spec.
#[derive(Default)]
pub struct ActionRegistryBuilder {
    builtins: bool,
    specs: Vec<ActionSpec>,
}

impl ActionRegistryBuilder {
    pub fn with_builtins(mut self) -> Self {
        self.builtins = true;
        self
    }

    pub fn action(mut self, spec: ActionSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<ActionRegistry, RegistryError> {
        let registry = if self.builtins {
            ActionRegistry::with_builtin_actions()?
        } else {
            ActionRegistry::new()
        };
        for spec in self.specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }
}

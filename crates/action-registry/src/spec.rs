//! Action definitions: name, parameter schema, availability and handler.

use std::fmt;
use std::sync::Arc;

use action_primitives::{ActionError, ActionPrimitives, ActionReport, ElementTarget, ExecCtx};
use async_trait::async_trait;
use perceiver_structural::Observation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::PageFilter;
use crate::schema::{ParamSchema, ValidatedParams};

/// Everything a handler receives for one invocation.
pub struct ActionCall<'a> {
    pub params: &'a ValidatedParams,
    /// Resolved element when the schema declares an element index field.
    pub element: Option<&'a ElementTarget>,
    pub observation: &'a Observation,
    pub page: &'a dyn ActionPrimitives,
    pub ctx: &'a ExecCtx,
}

/// What a handler reports back on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub message: Option<String>,
    pub extracted: Option<Value>,
    /// Set by terminal actions: `Some(success)` ends the run.
    pub done: Option<bool>,
    pub report: Option<ActionReport>,
}

impl ActionOutcome {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn from_report(report: ActionReport, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            report: Some(report),
            ..Default::default()
        }
    }

    pub fn with_extracted(mut self, value: Value) -> Self {
        self.extracted = Some(value);
        self
    }

    pub fn finished(success: bool, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            done: Some(success),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, call: ActionCall<'_>) -> Result<ActionOutcome, ActionError>;
}

/// A registered action. Built once with the builder methods, then shared.
#[derive(Clone)]
pub struct ActionSpec {
    name: String,
    description: String,
    params: ParamSchema,
    filter: PageFilter,
    changes_page: bool,
    handler: Arc<dyn ActionHandler>,
}

impl ActionSpec {
    pub fn new(name: &str, description: &str, handler: impl ActionHandler + 'static) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: ParamSchema::new(),
            filter: PageFilter::any(),
            changes_page: false,
            handler: Arc::new(handler),
        }
    }

    pub fn with_params(mut self, params: ParamSchema) -> Self {
        self.params = params;
        self
    }

    pub fn with_filter(mut self, filter: PageFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Declares that a successful run replaces the page the loop observed.
    pub fn changes_page(mut self) -> Self {
        self.changes_page = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &ParamSchema {
        &self.params
    }

    pub fn filter(&self) -> &PageFilter {
        &self.filter
    }

    pub fn is_page_changing(&self) -> bool {
        self.changes_page
    }

    pub(crate) fn handler(&self) -> &dyn ActionHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("filter", &self.filter)
            .field("changes_page", &self.changes_page)
            .finish()
    }
}

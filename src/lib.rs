//! WebPilot
//!
//! An observe, decide, act runtime for driving live web pages. Each step the
//! page is captured and its interactive elements indexed, an external
//! decision engine picks actions by index, and a schema-checked action
//! registry runs them against that same observation.
//!
//! The workspace crates are re-exported here; this crate adds layered
//! settings ([`config`]), tracing setup ([`telemetry`]) and history export
//! ([`export`]).

pub mod config;
pub mod export;
pub mod telemetry;

pub use action_primitives as primitives;
pub use action_registry as actions;
pub use agent_core as agent;
pub use cdp_adapter as chromium;
pub use perceiver_structural as perception;
pub use webpilot_core_types as types;

pub use action_registry::{ActionRegistry, ActionRequest, ActionResult, ActionSpec};
pub use agent_core::{
    AgentHistory, AgentLoop, AgentLoopConfig, AgentRunResult, DecisionEngine, DecisionError,
    DecisionInput, LoopStatus, TerminationReason,
};
pub use cdp_adapter::{CdpConfig, ChromiumPage, ChromiumSession};
pub use perceiver_structural::{DomIndexer, Observation, PageObserver, SelectorMap};

pub use crate::config::{LogSettings, Settings, SettingsError};
pub use export::{export_history, ExportError, ExportOptions};
pub use telemetry::init_tracing;

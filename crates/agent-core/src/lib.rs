//! WebPilot agent core.
//!
//! Drives one browser page through repeated observe, decide, act steps:
//! the page is captured and indexed, an external [`DecisionEngine`] picks a
//! batch of actions, and the [`action_registry::ActionRegistry`] validates
//! and runs them. The loop owns its history and stops on completion, on an
//! exhausted failure or step budget, or when cancelled.

pub mod agent_loop;
pub mod errors;

pub use agent_loop::{
    parse_requests, AgentHistory, AgentHistoryEntry, AgentLoop, AgentLoopConfig, AgentRunResult,
    AgentState, BrowserPage, DecisionEngine, DecisionInput, LoopStatus, StepFailure,
    TerminationReason,
};
pub use errors::{DecisionError, LoopError};

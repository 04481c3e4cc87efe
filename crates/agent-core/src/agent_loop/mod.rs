//! Agent loop (observe, decide, act).
//!
//! ```text
//! while running:
//!     observation = index(sample(page))   // fresh selector map every step
//!     requests    = engine.decide(task, history, observation, actions)
//!     results     = dispatch requests in order, cutting the batch on
//!                   done / failure / page change
//!     history.push(entry); update budgets
//! ```
//!
//! - [`AgentLoopConfig`]: budgets, timeouts and perception settings
//! - [`DecisionEngine`]: the external policy choosing actions
//! - [`AgentLoop`]: the state machine, stepped one step at a time or run to the end
//! - [`AgentHistory`]: the append-only record of every step

pub mod config;
pub mod controller;
pub mod decision;
pub mod types;

use action_primitives::ActionPrimitives;
use perceiver_structural::PageObserver;

pub use config::AgentLoopConfig;
pub use controller::AgentLoop;
pub use decision::{parse_requests, DecisionEngine, DecisionInput};
pub use types::{
    AgentHistory, AgentHistoryEntry, AgentRunResult, AgentState, LoopStatus, StepFailure,
    TerminationReason,
};

/// A page the loop can both observe and act on.
pub trait BrowserPage: PageObserver + ActionPrimitives {}

impl<T> BrowserPage for T where T: PageObserver + ActionPrimitives + ?Sized {}

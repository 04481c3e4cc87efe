//! Action primitives - the live page operations actions are built from
//!
//! - [`ActionPrimitives`]: navigate, click, type, select, scroll, keys, tabs, text extraction
//! - [`ExecCtx`]: per-action deadline and cancellation
//! - [`ActionError`]: failure taxonomy with retry and staleness hints

pub mod errors;
mod primitives;
pub mod types;

pub use errors::*;
pub use primitives::*;
pub use types::*;

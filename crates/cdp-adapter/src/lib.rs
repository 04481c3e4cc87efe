//! Chromium backend for WebPilot.
//!
//! [`ChromiumSession`] launches or attaches to a browser; each
//! [`ChromiumPage`] it opens is both a [`perceiver_structural::PageObserver`]
//! and an [`action_primitives::ActionPrimitives`], so one handle can be given
//! to an agent loop.
//!
//! Snapshots come from an in-page script that walks the DOM, including
//! same-origin iframes, and returns a flat node list; elements are addressed
//! back through their per-frame XPaths.

pub mod config;
pub mod errors;
pub mod keys;
mod page;
pub mod session;
pub mod snapshot;

pub use config::{detect_chrome_executable, CdpConfig};
pub use errors::{AdapterError, AdapterErrorKind};
pub use page::ChromiumPage;
pub use session::ChromiumSession;

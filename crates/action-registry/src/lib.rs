//! Action catalogue for WebPilot agents.
//!
//! Actions are declared once at startup as [`ActionSpec`]s with a closed
//! [`ParamSchema`] and an optional [`PageFilter`]. Per step, the
//! [`ActionRegistry`] tells the decision engine which actions apply to the
//! current page and turns each untrusted [`ActionRequest`] into an
//! [`ActionResult`] against the observation it was decided on.

pub mod builtin;
pub mod errors;
pub mod filter;
pub mod registry;
pub mod result;
pub mod schema;
pub mod spec;

pub use errors::{DispatchError, FailureKind, RegistryError};
pub use filter::{DomainPattern, PageContext, PageFilter};
pub use registry::{ActionDescriptor, ActionRegistry, ActionRegistryBuilder, DispatchOptions};
pub use result::{ActionRequest, ActionResult};
pub use schema::{FieldIssue, ParamField, ParamKind, ParamSchema, ValidatedParams};
pub use spec::{ActionCall, ActionHandler, ActionOutcome, ActionSpec};

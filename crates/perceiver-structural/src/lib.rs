//! Structural perception: capturing live pages and indexing their
//! interactive elements.
//!
//! A [`PageObserver`] produces a [`RawPageSnapshot`]; the [`Sampler`] bounds
//! how long that may take, and the [`DomIndexer`] turns the snapshot into an
//! immutable [`Observation`] whose [`SelectorMap`] names every interactive
//! element by a small integer index.

pub mod differ;
pub mod errors;
pub mod hash;
pub mod indexer;
pub mod judges;
pub mod model;
pub mod observation;
pub mod policy;
pub mod ports;
pub mod sampler;
mod truncate;

pub use differ::SelectorDiff;
pub use errors::{ObservationError, PerceiverError};
pub use hash::{ContentHash, HashPolicy, PositionSensitivity};
pub use indexer::DomIndexer;
pub use model::{FrameDocument, NodePath, RawNode, RawPageSnapshot, StyleInfo};
pub use observation::{
    ElementLocator, IndexedElement, Observation, PrunedNode, SelectorMap, TruncationWarning,
};
pub use policy::IndexerConfig;
pub use ports::PageObserver;
pub use sampler::{Sampler, SamplerConfig};

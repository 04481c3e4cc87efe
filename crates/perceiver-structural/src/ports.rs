use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ObservationError;
use crate::model::RawPageSnapshot;

/// Source of raw page snapshots.
///
/// Two captures with no page mutation between them must return structurally
/// equivalent trees. Screenshots and timestamps may differ.
#[async_trait]
pub trait PageObserver: Send + Sync {
    async fn capture(&self) -> Result<RawPageSnapshot, ObservationError>;

    /// Wait for in-flight network and layout work to quiet down. Callers bound
    /// this with `budget`; backends without a stability signal return at once.
    async fn settle(&self, budget: Duration) -> Result<(), ObservationError> {
        let _ = budget;
        Ok(())
    }
}

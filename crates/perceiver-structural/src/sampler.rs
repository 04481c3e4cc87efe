use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::errors::ObservationError;
use crate::model::RawPageSnapshot;
use crate::ports::PageObserver;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Upper bound on the pre-capture stability wait. Running out is not an error.
    pub settle_budget_ms: u64,
    pub capture_timeout_ms: u64,
    /// Extra attempts when the page reports it is mid-navigation.
    pub navigating_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            settle_budget_ms: 2_000,
            capture_timeout_ms: 15_000,
            navigating_retries: 2,
            retry_backoff_ms: 50,
        }
    }
}

/// Bounded capture around a [`PageObserver`].
#[derive(Clone, Debug, Default)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub async fn sample<O>(&self, observer: &O) -> Result<RawPageSnapshot, ObservationError>
    where
        O: PageObserver + ?Sized,
    {
        let max_attempts = self.config.navigating_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.settle(observer).await?;
            match self.capture_once(observer).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(ObservationError::Navigating(detail)) if attempt < max_attempts => {
                    debug!(attempt, %detail, "page navigating, retrying capture");
                    let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                    sleep(Duration::from_millis(backoff)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn settle<O>(&self, observer: &O) -> Result<(), ObservationError>
    where
        O: PageObserver + ?Sized,
    {
        let budget = Duration::from_millis(self.config.settle_budget_ms);
        match timeout(budget, observer.settle(budget)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ObservationError::Closed)) => Err(ObservationError::Closed),
            Ok(Err(err)) => {
                warn!(error = %err, "settle failed, capturing anyway");
                Ok(())
            }
            Err(_) => {
                debug!(budget_ms = self.config.settle_budget_ms, "settle budget elapsed");
                Ok(())
            }
        }
    }

    async fn capture_once<O>(&self, observer: &O) -> Result<RawPageSnapshot, ObservationError>
    where
        O: PageObserver + ?Sized,
    {
        let limit = self.config.capture_timeout_ms;
        timeout(Duration::from_millis(limit), observer.capture())
            .await
            .map_err(|_| ObservationError::Timeout(limit))?
    }
}

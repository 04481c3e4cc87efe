//! Configuration for the agent loop.

use std::time::Duration;

use perceiver_structural::{IndexerConfig, SamplerConfig};
use serde::{Deserialize, Serialize};

use crate::errors::LoopError;

/// Budgets, timeouts and perception settings for one agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Steps before the loop gives up.
    /// Default: 100
    pub max_steps: u32,

    /// Requests dispatched from one decision; the rest are recorded as skipped.
    /// Default: 3
    pub max_actions_per_step: u32,

    /// Consecutive failed steps before aborting.
    /// Default: 3
    pub max_consecutive_failures: u32,

    /// Keep screenshots in the observation handed to the decision engine.
    /// Default: true
    pub enable_vision: bool,

    /// Per-action handler timeout in milliseconds.
    /// Default: 30000
    pub action_timeout_ms: u64,

    /// Decision engine round trip timeout in milliseconds.
    /// Default: 60000
    pub decision_timeout_ms: u64,

    /// Pause between consecutive dispatches in one batch.
    /// Default: 100
    pub wait_between_actions_ms: u64,

    pub indexer: IndexerConfig,
    pub sampler: SamplerConfig,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_actions_per_step: 3,
            max_consecutive_failures: 3,
            enable_vision: true,
            action_timeout_ms: 30_000,
            decision_timeout_ms: 60_000,
            wait_between_actions_ms: 100,
            indexer: IndexerConfig::default(),
            sampler: SamplerConfig::default(),
        }
    }
}

impl AgentLoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small budgets and short timeouts, for tests and smoke runs.
    pub fn minimal() -> Self {
        Self {
            max_steps: 10,
            max_actions_per_step: 1,
            max_consecutive_failures: 2,
            enable_vision: false,
            action_timeout_ms: 5_000,
            decision_timeout_ms: 10_000,
            wait_between_actions_ms: 0,
            indexer: IndexerConfig::default().with_max_nodes(1_000),
            sampler: SamplerConfig {
                settle_budget_ms: 250,
                capture_timeout_ms: 5_000,
                navigating_retries: 1,
                ..SamplerConfig::default()
            },
        }
    }

    /// Text-only perception with tighter timeouts.
    pub fn fast() -> Self {
        Self {
            max_steps: 50,
            max_actions_per_step: 3,
            max_consecutive_failures: 2,
            enable_vision: false,
            action_timeout_ms: 15_000,
            decision_timeout_ms: 30_000,
            wait_between_actions_ms: 50,
            indexer: IndexerConfig::default().with_max_text_length(80),
            sampler: SamplerConfig {
                settle_budget_ms: 1_000,
                capture_timeout_ms: 10_000,
                ..SamplerConfig::default()
            },
        }
    }

    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn actions_per_step(mut self, count: u32) -> Self {
        self.max_actions_per_step = count;
        self
    }

    pub fn failure_budget(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    pub fn vision(mut self, enabled: bool) -> Self {
        self.enable_vision = enabled;
        self
    }

    pub fn action_timeout(mut self, ms: u64) -> Self {
        self.action_timeout_ms = ms;
        self
    }

    pub fn decision_timeout(mut self, ms: u64) -> Self {
        self.decision_timeout_ms = ms;
        self
    }

    pub fn wait_between_actions(mut self, ms: u64) -> Self {
        self.wait_between_actions_ms = ms;
        self
    }

    pub fn indexer(mut self, indexer: IndexerConfig) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    pub(crate) fn action_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub(crate) fn decision_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    pub(crate) fn wait_between_actions_duration(&self) -> Duration {
        Duration::from_millis(self.wait_between_actions_ms)
    }

    pub fn validate(&self) -> Result<(), LoopError> {
        if self.max_steps == 0 {
            return Err(LoopError::invalid_config("max_steps must be positive"));
        }
        if self.max_actions_per_step == 0 {
            return Err(LoopError::invalid_config(
                "max_actions_per_step must be positive",
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(LoopError::invalid_config(
                "max_consecutive_failures must be positive",
            ));
        }
        if self.action_timeout_ms == 0 || self.decision_timeout_ms == 0 {
            return Err(LoopError::invalid_config("timeouts must be positive"));
        }
        self.indexer.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.max_actions_per_step, 3);
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.action_timeout_duration(), Duration::from_secs(30));
        assert_eq!(config.decision_timeout_duration(), Duration::from_secs(60));
        assert!(config.enable_vision);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AgentLoopConfig::new()
            .max_steps(50)
            .vision(false)
            .actions_per_step(2)
            .failure_budget(5);

        assert_eq!(config.max_steps, 50);
        assert!(!config.enable_vision);
        assert_eq!(config.max_actions_per_step, 2);
        assert_eq!(config.max_consecutive_failures, 5);
    }

    #[test]
    fn presets_are_valid() {
        assert!(AgentLoopConfig::minimal().validate().is_ok());
        assert!(AgentLoopConfig::fast().validate().is_ok());
        assert!(!AgentLoopConfig::minimal().enable_vision);
    }

    #[test]
    fn zero_budgets_are_rejected() {
        assert!(matches!(
            AgentLoopConfig::new().max_steps(0).validate(),
            Err(LoopError::InvalidConfig(_))
        ));
        assert!(AgentLoopConfig::new().actions_per_step(0).validate().is_err());
        assert!(AgentLoopConfig::new().failure_budget(0).validate().is_err());
    }

    #[test]
    fn indexer_settings_are_checked() {
        let config = AgentLoopConfig::new().indexer(IndexerConfig::default().with_max_nodes(0));
        assert!(matches!(config.validate(), Err(LoopError::Indexer(_))));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AgentLoopConfig =
            serde_json::from_str(r#"{"max_steps": 7, "sampler": {"navigating_retries": 0}}"#)
                .unwrap();
        assert_eq!(config.max_steps, 7);
        assert_eq!(config.max_actions_per_step, 3);
        assert_eq!(config.sampler.navigating_retries, 0);
        assert_eq!(config.sampler.capture_timeout_ms, 15_000);
    }
}

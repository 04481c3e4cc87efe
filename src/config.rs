//! Layered settings.
//!
//! Built-in defaults, then an optional TOML/YAML/JSON file, then
//! `WEBPILOT__`-prefixed environment variables with `__` between path
//! segments, e.g. `WEBPILOT__AGENT__MAX_STEPS=20` or
//! `WEBPILOT__BROWSER__HEADLESS=false`.

use std::path::{Path, PathBuf};

use ::config::{Config, ConfigError, Environment, File};
use agent_core::{AgentLoopConfig, LoopError};
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "WEBPILOT";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid agent settings: {0}")]
    Invalid(#[from] LoopError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub agent: AgentLoopConfig,
    pub browser: CdpConfig,
    pub log: LogSettings,
}

impl Settings {
    /// Load settings, reading `path` if given and the user config file
    /// (see [`Settings::default_path`]) otherwise, when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(SettingsError::NotFound(path.to_path_buf()));
                }
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(File::from(default_path).required(false));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.agent.validate()?;
        debug!(
            max_steps = settings.agent.max_steps,
            headless = settings.browser.headless,
            "settings loaded"
        );
        Ok(settings)
    }

    /// `<config dir>/webpilot/config.toml`, e.g. `~/.config/webpilot/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("webpilot").join("config.toml"))
    }
}

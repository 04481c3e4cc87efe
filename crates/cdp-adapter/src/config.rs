use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use serde::{Deserialize, Serialize};
use which::which;

use crate::errors::{AdapterError, AdapterErrorKind};

/// Configuration for launching or attaching to Chromium.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub no_sandbox: bool,
    /// Per-request DevTools timeout.
    pub default_deadline_ms: u64,
    pub launch_timeout_ms: u64,
    /// Attach to a running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Attach a PNG screenshot to every capture.
    pub capture_screenshots: bool,
    /// Upper bound on nodes the snapshot script walks.
    pub snapshot_node_limit: usize,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: default_profile_dir(),
            headless: resolve_headless_default(),
            no_sandbox: false,
            default_deadline_ms: 30_000,
            launch_timeout_ms: 20_000,
            websocket_url: None,
            viewport_width: 1280,
            viewport_height: 800,
            capture_screenshots: false,
            snapshot_node_limit: 50_000,
        }
    }
}

impl CdpConfig {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = dir.into();
        self
    }

    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    pub fn with_screenshots(mut self, enabled: bool) -> Self {
        self.capture_screenshots = enabled;
        self
    }

    /// Resolve the profile directory against the working directory and make
    /// sure it exists.
    pub fn prepare_profile_dir(&self) -> Result<PathBuf, AdapterError> {
        let profile_dir = if self.user_data_dir.is_absolute() {
            self.user_data_dir.clone()
        } else {
            let cwd = env::current_dir().map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("failed to resolve cwd for user-data-dir: {err}"))
            })?;
            cwd.join(&self.user_data_dir)
        };
        std::fs::create_dir_all(&profile_dir).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("failed to ensure user-data-dir: {err}"))
        })?;
        Ok(profile_dir)
    }

    pub(crate) fn browser_config(&self) -> Result<BrowserConfig, AdapterError> {
        if !self.executable.as_os_str().is_empty() && !self.executable.exists() {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint(format!(
                "chrome executable not found at {}; set WEBPILOT_CHROME",
                self.executable.display()
            )));
        }
        let profile_dir = self.prepare_profile_dir()?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_millis(self.default_deadline_ms))
            .launch_timeout(Duration::from_millis(self.launch_timeout_ms))
            .viewport(CdpViewport {
                width: self.viewport_width,
                height: self.viewport_height,
                ..Default::default()
            })
            .window_size(self.viewport_width, self.viewport_height);

        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox || sandbox_disabled_by_env() {
            builder = builder.no_sandbox();
        }

        builder = builder.args(launch_args(self.headless));
        if !self.executable.as_os_str().is_empty() {
            builder = builder.chrome_executable(self.executable.clone());
        }
        builder = builder.user_data_dir(profile_dir);

        builder.build().map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("browser config error: {err}"))
        })
    }
}

fn launch_args(headless: bool) -> Vec<&'static str> {
    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--use-mock-keychain",
    ];
    if headless {
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    args
}

fn resolve_headless_default() -> bool {
    // "0", "false", "no", "off" mean headful
    match env::var("WEBPILOT_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

fn sandbox_disabled_by_env() -> bool {
    env::var("WEBPILOT_DISABLE_SANDBOX")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_profile_dir() -> PathBuf {
    if let Ok(path) = env::var("WEBPILOT_CHROME_PROFILE") {
        return PathBuf::from(path);
    }
    Path::new("./.webpilot-profile").into()
}

/// Locate a Chromium-family executable: `WEBPILOT_CHROME`, then `PATH`, then
/// the usual install locations.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("WEBPILOT_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/snap/bin/chromium"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = CdpConfig::default().with_user_data_dir(dir.path().join("profile"));
        let resolved = config.prepare_profile_dir().unwrap();
        assert!(resolved.is_dir());
    }

    #[test]
    fn missing_executable_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = CdpConfig {
            executable: dir.path().join("no-such-chrome"),
            ..CdpConfig::default()
        };
        let err = config.browser_config().unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.to_string().contains("no-such-chrome"));
    }

    #[test]
    fn headless_launch_hides_scrollbars() {
        assert!(launch_args(true).contains(&"--hide-scrollbars"));
        assert!(!launch_args(false).contains(&"--hide-scrollbars"));
    }
}

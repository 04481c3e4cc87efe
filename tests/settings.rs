use std::path::Path;

use serial_test::serial;
use webpilot::config::{Settings, SettingsError};

fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("WEBPILOT__") {
            std::env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn file_values_override_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webpilot.toml");
    std::fs::write(
        &path,
        r#"
[agent]
max_steps = 12
enable_vision = false

[agent.sampler]
navigating_retries = 0

[browser]
headless = true
viewport_width = 1024

[log]
level = "debug"
"#,
    )
    .unwrap();

    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.agent.max_steps, 12);
    assert!(!settings.agent.enable_vision);
    assert_eq!(settings.agent.max_actions_per_step, 3);
    assert_eq!(settings.agent.sampler.navigating_retries, 0);
    assert_eq!(settings.agent.sampler.capture_timeout_ms, 15_000);
    assert!(settings.browser.headless);
    assert_eq!(settings.browser.viewport_width, 1024);
    assert_eq!(settings.log.level, "debug");
}

#[test]
#[serial]
fn environment_overrides_the_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webpilot.yaml");
    std::fs::write(&path, "agent:\n  max_steps: 12\n  wait_between_actions_ms: 10\n").unwrap();

    std::env::set_var("WEBPILOT__AGENT__MAX_STEPS", "30");
    let settings = Settings::load(Some(&path));
    clear_env();

    let settings = settings.unwrap();
    assert_eq!(settings.agent.max_steps, 30);
    assert_eq!(settings.agent.wait_between_actions_ms, 10);
}

#[test]
#[serial]
fn missing_file_is_an_error() {
    clear_env();
    let err = Settings::load(Some(Path::new("/nonexistent/webpilot.toml"))).unwrap_err();
    assert!(matches!(err, SettingsError::NotFound(_)));
}

#[test]
#[serial]
fn invalid_budgets_are_rejected() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webpilot.json");
    std::fs::write(&path, r#"{"agent": {"max_consecutive_failures": 0}}"#).unwrap();

    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, SettingsError::Invalid(_)), "{err}");
}

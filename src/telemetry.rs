use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::LogSettings;

static INIT: OnceCell<()> = OnceCell::new();

/// Install a global subscriber filtered by `RUST_LOG`, falling back to
/// `default_level`. Only the first call has any effect.
pub fn init_tracing(default_level: &str) {
    init_with(&LogSettings {
        level: default_level.to_string(),
        ..LogSettings::default()
    });
}

/// Like [`init_tracing`], with JSON output when `settings.json` is set.
pub fn init_with(settings: &LogSettings) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = if settings.json {
            fmt::layer().json().with_target(true).boxed()
        } else {
            fmt::layer().with_ansi(false).with_target(false).boxed()
        };
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("debug");
        init_tracing("warn");
        let span = tracing::info_span!("agent_step", step = 1u32);
        span.in_scope(|| tracing::info!(action = "click", "within span"));
    }
}

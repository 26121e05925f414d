//! Telemetry initialization: tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise the configured log level is applied
//! to this crate with `tower_http` and `sqlx` kept at sensible defaults.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Default filter directive for a given log level.
pub fn default_filter(log_level: &str) -> String {
    format!(
        "lpr_gateway_backend={level},lpr_gateway={level},tower_http=info,sqlx::query=warn",
        level = log_level
    )
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level).into());

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}

//! Telemetry and Observability
//!
//! Installs the `tracing-subscriber` registry. The filter comes from
//! `RUST_LOG` when set, otherwise from the configured level. Output is
//! pretty in debug builds and JSON in release builds unless the
//! configuration pins a format.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty in debug builds, JSON in release builds
    #[default]
    Auto,
    Pretty,
    Json,
}

impl LogFormat {
    fn use_json(self) -> bool {
        match self {
            LogFormat::Pretty => false,
            LogFormat::Json => true,
            LogFormat::Auto => !cfg!(debug_assertions),
        }
    }
}

fn build_filter(log_level: &str) -> EnvFilter {
    let default_filter = format!(
        "{},framewright_engine={},sqlx=warn",
        log_level, log_level
    );
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Initialize the tracing subscriber.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter. Only the first call
/// in a process installs a subscriber; later calls are ignored.
pub fn init_telemetry_with(log_level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(build_filter(log_level));

    if format.use_json() {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }
}

/// Initialize with the given level and the build's default format
pub fn init_telemetry_with_level(log_level: &str) {
    init_telemetry_with(log_level, LogFormat::Auto);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_formats() {
        assert!(LogFormat::Json.use_json());
        assert!(!LogFormat::Pretty.use_json());
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_telemetry_with("debug", LogFormat::Pretty);
        init_telemetry_with_level("info");
    }
}

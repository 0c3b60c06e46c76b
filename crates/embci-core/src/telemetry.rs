//! Centralised tracing initialisation for the `embci` binary.
//!
//! Call [`init_tracing`] once at program start. Build tool output does not
//! go through the subscriber; it is forwarded verbatim to stdout so the job
//! console shows it unchanged.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment switch selecting JSON log lines.
pub const LOG_JSON_ENV: &str = "EMBCI_LOG_JSON";

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON instead of the human format.
/// * `level` - default verbosity when `RUST_LOG` is not set.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Whether `EMBCI_LOG_JSON` asks for JSON output (`1`, `true`, `yes`).
pub fn json_requested() -> bool {
    std::env::var(LOG_JSON_ENV)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}

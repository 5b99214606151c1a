//! Shared tracing/logging initialization.
//!
//! Sets up `tracing_subscriber` with an env-filter and optional JSON output.
//! The tunnel binary's own output is never forwarded here; only the gateway's
//! structured events are.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for some crates at a given level.
/// `fireside_core` is always included.
///
/// `verbose` overrides `level` with `debug`, which is where tunnel
/// reconnects and URL updates are reported.
pub fn default_filter(targets: &[&str], level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    targets
        .iter()
        .chain(std::iter::once(&"fireside_core"))
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"fireside_server=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_requested_level() {
        assert_eq!(
            default_filter(&["fireside_server"], "warn", false),
            "fireside_server=warn,fireside_core=warn"
        );
    }

    #[test]
    fn verbose_forces_debug() {
        assert_eq!(
            default_filter(&["fireside_server", "fireside"], "info", true),
            "fireside_server=debug,fireside=debug,fireside_core=debug"
        );
    }
}

//! Tracing subscriber setup.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `--verbose` is passed and `RUST_LOG` is unset.
pub const VERBOSE_FILTER: &str = "corkboard=debug,tower_http=debug,info";

/// Build the env filter: `RUST_LOG` wins over the configured directive.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init_tracing(default_filter: &str, json: bool) -> Result<()> {
    let filter = env_filter(default_filter);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = init_tracing("info", false);
        assert!(init_tracing("info", true).is_err());
    }

    #[test]
    fn test_verbose_filter_parses() {
        assert!(EnvFilter::try_new(VERBOSE_FILTER).is_ok());
    }
}

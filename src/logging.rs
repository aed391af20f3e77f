//! Structured logging setup.
//!
//! Log lines go to stderr so that stdout stays reserved for command output
//! (`tree`, `gen-config`, pass reports). Level precedence: `RUST_LOG`, then
//! `--verbose` (debug), then the `info` default.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Filter from `RUST_LOG`, falling back to the verbosity flag.
pub fn build_env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(verbose: bool) -> Result<(), TryInitError> {
    Registry::default()
        .with(build_env_filter(verbose))
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
                .with_writer(std::io::stderr),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_selects_level() {
        assert_eq!(default_level(false), "info");
        assert_eq!(default_level(true), "debug");
    }

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init_logging(false);
        assert!(init_logging(true).is_err());
    }
}

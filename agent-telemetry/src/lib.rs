//! Logging initialisation for agents.
//!
//! Installs a `tracing-subscriber` formatter. `RUST_LOG` wins over the
//! configured filter when set.

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter {
        /// Directive as supplied.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {reason}")]
    AlreadyInstalled {
        /// Message from `tracing-subscriber`.
        reason: String,
    },
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Builds the filter in effect: `RUST_LOG` when set, otherwise `fallback`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when the directive is malformed.
pub fn env_filter(fallback: &str) -> TelemetryResult<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directive) if !directive.trim().is_empty() => parse_filter(&directive),
        _ => parse_filter(fallback),
    }
}

fn parse_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidFilter {
        filter: directive.to_owned(),
        reason: err.to_string(),
    })
}

/// Installs the global formatter with the filter from [`env_filter`].
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a malformed directive and
/// [`TelemetryError::AlreadyInstalled`] when called twice.
pub fn init_tracing(fallback: &str) -> TelemetryResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback)?)
        .with_target(false)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled {
            reason: err.to_string(),
        })
}

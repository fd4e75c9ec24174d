//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided dispatch pass identifier could not be parsed.
    #[error("invalid pass id: {source}")]
    InvalidPassId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Capability name failed validation.
    #[error("invalid capability name `{name}`: {reason}")]
    InvalidCapabilityName {
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Capability descriptor failed validation.
    #[error("invalid capability: {reason}")]
    InvalidCapability {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

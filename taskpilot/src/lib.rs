//! Expose ordinary operations to a language model as tools and run the calls
//! it chooses.
//!
//! Depend on this crate via `cargo add taskpilot`. It bundles the internal
//! crates behind feature flags so downstream users can enable or disable
//! components as needed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Call parsing, resolution, and dispatch (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Model adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Capability registry and schema generation (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

//! Core shared types for taskpilot.
//!
//! Capabilities are declared once through an explicit [`CapabilityDescriptor`];
//! everything the model sees ([`ToolDescription`]) is a projection of that
//! descriptor.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod description;
mod error;
mod ids;

/// Capability descriptors and supporting builders.
pub use capability::{CapabilityBuilder, CapabilityDescriptor, DeclaredType, ParamDecl};
/// Model-facing tool descriptions and wire formats.
pub use description::{ParamKind, ParameterSpec, SchemaError, SchemaFormat, ToolDescription};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifiers for calls and dispatch passes.
pub use ids::{CallId, PassId};

//! Capability registration and tool schema generation.
//!
//! Capabilities are registered once with an explicit descriptor into a
//! [`registry::CapabilityRegistry`]; [`schema`] projects those descriptors into
//! the JSON tool descriptions each model provider expects. The
//! [`capability`] attribute derives a descriptor from a function signature.

#![warn(missing_docs, clippy::pedantic)]

pub mod arguments;
pub mod registry;
pub mod schema;

pub use agent_primitives::{CapabilityDescriptor, DeclaredType, Error as DescriptorError, ParamDecl};
pub use agent_tools_macros::capability;

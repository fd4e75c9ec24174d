//! Capability registry and argument alias table.
//!
//! The registry is assembled once through [`RegistryBuilder`] and is
//! immutable afterwards; looking up a name that was never registered is a
//! typed [`ToolError::UnknownTool`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use agent_primitives::{CapabilityDescriptor, SchemaFormat, ToolDescription};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::arguments::Arguments;
use crate::schema;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Trait implemented by capability executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the capability with resolved arguments, returning its result.
    async fn invoke(&self, args: Arguments) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Arguments) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, args: Arguments) -> ToolResult<Value> {
        (self)(args).await
    }
}

/// A registered capability: its descriptor plus the executor behind it.
#[derive(Clone)]
pub struct Capability {
    descriptor: CapabilityDescriptor,
    executor: Arc<dyn Tool>,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.descriptor.name())
            .finish_non_exhaustive()
    }
}

impl Capability {
    /// Returns the associated descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// Executes the underlying capability.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the implementation.
    pub async fn invoke(&self, args: Arguments) -> ToolResult<Value> {
        self.executor.invoke(args).await
    }
}

/// Table mapping public argument names (as the model writes them) to the
/// canonical parameter names capabilities declare.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArgumentAliases {
    table: HashMap<String, String>,
}

impl ArgumentAliases {
    /// Creates an empty table; every key maps to itself.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table covering the email, calendar, and stock capabilities' public
    /// argument spellings.
    #[must_use]
    pub fn builtin() -> Self {
        [
            ("email_address", "recipient"),
            ("email_subject", "subject"),
            ("email_body", "body"),
            ("event_date", "date"),
            ("event_start_time", "time"),
            ("shared_with", "attendees"),
            ("stock_symbol", "symbol"),
        ]
        .into_iter()
        .collect()
    }

    /// Adds or replaces an alias.
    pub fn insert(&mut self, public: impl Into<String>, canonical: impl Into<String>) {
        self.table.insert(public.into(), canonical.into());
    }

    /// Returns the canonical name for `key`, or `key` itself when unmapped.
    #[must_use]
    pub fn canonical<'a>(&'a self, key: &'a str) -> &'a str {
        self.table.get(key).map_or(key, String::as_str)
    }

    /// Number of aliases in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` when no aliases are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<P, C> FromIterator<(P, C)> for ArgumentAliases
where
    P: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut aliases = Self::new();
        for (public, canonical) in iter {
            aliases.insert(public, canonical);
        }
        aliases
    }
}

/// Builder collecting capabilities before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
    aliases: ArgumentAliases,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    pub fn register<T>(&mut self, descriptor: CapabilityDescriptor, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        let name = descriptor.name().to_owned();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }

        debug!(tool = %name, params = descriptor.params().len(), "capability registered");
        self.index.insert(name, self.capabilities.len());
        self.capabilities.push(Capability {
            descriptor,
            executor: Arc::new(tool),
        });

        Ok(())
    }

    /// Registers a capability, returning the builder for chaining.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    pub fn with<T>(mut self, descriptor: CapabilityDescriptor, tool: T) -> ToolResult<Self>
    where
        T: Tool + 'static,
    {
        self.register(descriptor, tool)?;
        Ok(self)
    }

    /// Replaces the argument alias table.
    #[must_use]
    pub fn with_aliases(mut self, aliases: ArgumentAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            capabilities: self.capabilities,
            index: self.index,
            aliases: self.aliases,
        }
    }
}

/// Immutable set of capabilities keyed by name, in registration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
    aliases: ArgumentAliases,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("registered", &self.names())
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Starts assembling a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Returns the capability registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when no such capability exists.
    pub fn get(&self, name: &str) -> ToolResult<&Capability> {
        self.index
            .get(name)
            .map(|&slot| &self.capabilities[slot])
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_owned(),
            })
    }

    /// Returns `true` when a capability named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.capabilities
            .iter()
            .map(|capability| capability.descriptor.name())
            .collect()
    }

    /// Returns the argument alias table.
    #[must_use]
    pub fn aliases(&self) -> &ArgumentAliases {
        &self.aliases
    }

    /// Invokes a registered capability directly.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the capability is not found or
    /// propagates the implementation's error.
    pub async fn invoke(&self, name: &str, args: Arguments) -> ToolResult<Value> {
        self.get(name)?.invoke(args).await
    }

    /// Tool descriptions for every capability, in registration order.
    #[must_use]
    pub fn descriptions(&self) -> Vec<ToolDescription> {
        self.capabilities
            .iter()
            .map(|capability| schema::describe(&capability.descriptor))
            .collect()
    }

    /// Tool descriptions rendered in the supplied wire format.
    #[must_use]
    pub fn render(&self, format: SchemaFormat) -> Vec<Value> {
        self.descriptions()
            .iter()
            .map(|description| schema::render(description, format))
            .collect()
    }
}

/// Errors produced by capability registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Arguments could not be interpreted by the capability.
    #[error("invalid tool arguments: {reason}")]
    InvalidArguments {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates an argument error from the supplied reason.
    #[must_use]
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }
}

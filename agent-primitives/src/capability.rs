//! Capability descriptors shared across the runtime.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 64;

/// Type a capability declares for one of its parameters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    /// Free-form text.
    Str,
    /// Whole number.
    Int,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Bool,
    /// A collection of values; single scalars are wrapped on the way in.
    List,
    /// No type was declared.
    #[default]
    Unspecified,
}

/// One declared parameter of a capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    name: String,
    #[serde(default)]
    declared_type: DeclaredType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default)]
    contextual: bool,
}

impl ParamDecl {
    /// Declares a parameter with the supplied name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            default: None,
            contextual: false,
        }
    }

    /// Gives the parameter a default value, making it optional for callers.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Makes the parameter optional without a concrete default value.
    #[must_use]
    pub fn optional(self) -> Self {
        self.with_default(Value::Null)
    }

    /// Marks the parameter as filled from ambient context when the model
    /// omits it.
    #[must_use]
    pub fn contextual(mut self) -> Self {
        self.contextual = true;
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn declared_type(&self) -> DeclaredType {
        self.declared_type
    }

    /// Returns the default value if one was declared.
    #[must_use]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns `true` when the parameter has a default.
    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Returns `true` when ambient context may supply the value.
    #[must_use]
    pub const fn is_contextual(&self) -> bool {
        self.contextual
    }
}

/// Explicit, declared-once description of an invokable capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    name: String,
    #[serde(default)]
    documentation: String,
    #[serde(default)]
    params: Vec<ParamDecl>,
    #[serde(default)]
    receiver: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provides_context: Option<String>,
    #[serde(default)]
    yields_tasks: bool,
}

impl CapabilityDescriptor {
    /// Starts building a descriptor for the named capability.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CapabilityBuilder {
        CapabilityBuilder {
            name: name.into(),
            documentation: String::new(),
            params: Vec::new(),
            receiver: false,
            provides_context: None,
            yields_tasks: false,
        }
    }

    /// Returns the capability name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw documentation text.
    #[must_use]
    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    /// Returns every declared parameter, receiver included.
    #[must_use]
    pub fn declared_params(&self) -> &[ParamDecl] {
        &self.params
    }

    /// Returns the parameters callers supply, skipping an implicit receiver.
    #[must_use]
    pub fn params(&self) -> &[ParamDecl] {
        if self.receiver {
            self.params.get(1..).unwrap_or_default()
        } else {
            &self.params
        }
    }

    /// Looks up a caller-facing parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params().iter().find(|param| param.name == name)
    }

    /// Ambient context key this capability's result is published under.
    #[must_use]
    pub fn provides_context(&self) -> Option<&str> {
        self.provides_context.as_deref()
    }

    /// Returns `true` when the capability returns a task list to dispatch.
    #[must_use]
    pub const fn yields_tasks(&self) -> bool {
        self.yields_tasks
    }
}

/// Builder for [`CapabilityDescriptor`].
#[derive(Debug)]
pub struct CapabilityBuilder {
    name: String,
    documentation: String,
    params: Vec<ParamDecl>,
    receiver: bool,
    provides_context: Option<String>,
    yields_tasks: bool,
}

impl CapabilityBuilder {
    /// Sets the documentation text. Lines of the form
    /// `:param <name>: <text>` describe individual parameters.
    #[must_use]
    pub fn documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = documentation.into();
        self
    }

    /// Appends a parameter declaration.
    #[must_use]
    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    /// Declares that the first parameter is an implicit receiver.
    #[must_use]
    pub fn with_receiver(mut self) -> Self {
        self.receiver = true;
        self
    }

    /// Publishes the capability's result as ambient context under `key`.
    #[must_use]
    pub fn provides_context(mut self, key: impl Into<String>) -> Self {
        self.provides_context = Some(key.into());
        self
    }

    /// Marks the capability as returning a task list for recursive dispatch.
    #[must_use]
    pub fn yields_tasks(mut self) -> Self {
        self.yields_tasks = true;
        self
    }

    /// Finalises the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapabilityName`] when the name is not a valid
    /// tool identifier, or [`Error::InvalidCapability`] when parameter names
    /// repeat or a receiver is declared without any parameters.
    pub fn build(self) -> Result<CapabilityDescriptor> {
        validate_name(&self.name)?;

        if self.receiver && self.params.is_empty() {
            return Err(Error::InvalidCapability {
                reason: format!("`{}` declares a receiver but no parameters", self.name),
            });
        }

        let mut seen = BTreeSet::new();
        for param in &self.params {
            validate_name(param.name())?;
            if !seen.insert(param.name()) {
                return Err(Error::InvalidCapability {
                    reason: format!(
                        "parameter `{}` declared twice on `{}`",
                        param.name(),
                        self.name
                    ),
                });
            }
        }

        Ok(CapabilityDescriptor {
            name: self.name,
            documentation: self.documentation,
            params: self.params,
            receiver: self.receiver,
            provides_context: self.provides_context,
            yields_tasks: self.yields_tasks,
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidCapabilityName {
            name: String::new(),
            reason: "name cannot be empty".into(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidCapabilityName {
            name: name.into(),
            reason: format!("name length must be <= {MAX_NAME_LEN}"),
        });
    }

    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_well || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidCapabilityName {
            name: name.into(),
            reason: "name must be an identifier of ascii letters, digits, or underscores".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_descriptor_success() {
        let descriptor = CapabilityDescriptor::builder("add_calendar_event")
            .documentation("Add an event.\n\n:param event_name: Title")
            .param(ParamDecl::new("event_name", DeclaredType::Str))
            .param(ParamDecl::new("attendees", DeclaredType::List))
            .param(ParamDecl::new("event_start_time", DeclaredType::Str).with_default("00:00"))
            .build()
            .expect("build");

        assert_eq!(descriptor.name(), "add_calendar_event");
        assert_eq!(descriptor.params().len(), 3);
        assert!(descriptor.param("event_start_time").unwrap().has_default());
        assert!(descriptor.param("missing").is_none());
    }

    #[test]
    fn receiver_is_hidden_from_callers() {
        let descriptor = CapabilityDescriptor::builder("get_user")
            .with_receiver()
            .param(ParamDecl::new("self", DeclaredType::Unspecified))
            .param(ParamDecl::new("key", DeclaredType::Str))
            .build()
            .expect("build");

        assert_eq!(descriptor.declared_params().len(), 2);
        assert_eq!(descriptor.params().len(), 1);
        assert_eq!(descriptor.params()[0].name(), "key");
    }

    #[test]
    fn duplicate_params_rejected() {
        let err = CapabilityDescriptor::builder("send_email")
            .param(ParamDecl::new("recipient", DeclaredType::Str))
            .param(ParamDecl::new("recipient", DeclaredType::Str))
            .build()
            .expect_err("should fail");

        assert!(matches!(err, Error::InvalidCapability { .. }));
    }

    #[test]
    fn invalid_names_rejected() {
        for name in ["", "default_api.scan", "1scan", "scan-dir"] {
            let err = CapabilityDescriptor::builder(name)
                .build()
                .expect_err("should fail");
            assert!(matches!(err, Error::InvalidCapabilityName { .. }), "{name}");
        }
    }
}

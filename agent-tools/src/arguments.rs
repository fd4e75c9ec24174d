//! Argument maps passed to capabilities.

use serde_json::{Map, Value};

use crate::registry::{ToolError, ToolResult};

/// Ordered argument map handed to a capability.
pub type Arguments = Map<String, Value>;

/// Typed accessors used by capability implementations.
pub trait ArgumentsExt {
    /// Returns the string argument `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when the argument is missing or
    /// not a string.
    fn required_str(&self, name: &str) -> ToolResult<&str>;

    /// Returns the string argument `name` if present.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when the argument is present
    /// but not a string.
    fn optional_str(&self, name: &str) -> ToolResult<Option<&str>>;

    /// Returns the argument `name` as a list of strings. A lone string is
    /// accepted as a one-element list.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when the argument is missing or
    /// contains non-string entries.
    fn string_list(&self, name: &str) -> ToolResult<Vec<String>>;
}

impl ArgumentsExt for Arguments {
    fn required_str(&self, name: &str) -> ToolResult<&str> {
        self.optional_str(name)?
            .ok_or_else(|| ToolError::invalid_arguments(format!("missing argument `{name}`")))
    }

    fn optional_str(&self, name: &str) -> ToolResult<Option<&str>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(ToolError::invalid_arguments(format!(
                "argument `{name}` must be a string, got {other}"
            ))),
        }
    }

    fn string_list(&self, name: &str) -> ToolResult<Vec<String>> {
        match self.get(name) {
            Some(Value::String(value)) => Ok(vec![value.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        ToolError::invalid_arguments(format!(
                            "argument `{name}` must only contain strings"
                        ))
                    })
                })
                .collect(),
            Some(other) => Err(ToolError::invalid_arguments(format!(
                "argument `{name}` must be a list of strings, got {other}"
            ))),
            None => Err(ToolError::invalid_arguments(format!(
                "missing argument `{name}`"
            ))),
        }
    }
}

//! Model-facing tool descriptions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DeclaredType;

/// Value kind advertised to the model for a parameter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamKind {
    /// Text (also used for undeclared or unrecognised types).
    #[default]
    String,
    /// Integer or floating point number.
    Number,
    /// Boolean flag.
    Boolean,
}

impl ParamKind {
    /// Infers the advertised kind from a declared type.
    #[must_use]
    pub const fn from_declared(declared: DeclaredType) -> Self {
        match declared {
            DeclaredType::Int | DeclaredType::Float => Self::Number,
            DeclaredType::Bool => Self::Boolean,
            DeclaredType::Str | DeclaredType::List | DeclaredType::Unspecified => Self::String,
        }
    }

    /// Upper-case token (`STRING`, `NUMBER`, `BOOLEAN`).
    #[must_use]
    pub const fn upper(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// Lower-case token (`string`, `number`, `boolean`).
    #[must_use]
    pub const fn lower(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// Description of one parameter as presented to the model.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: String,
    /// Advertised value kind.
    pub kind: ParamKind,
    /// Per-parameter text; empty when undocumented.
    pub description: String,
    /// `true` iff the parameter has no default.
    pub required: bool,
}

/// Tool description generated from a capability descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    /// Tool name, unique within a registry snapshot.
    pub name: String,
    /// First documentation paragraph; empty when undocumented.
    pub description: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDescription {
    /// Names of the required parameters, in declaration order.
    #[must_use]
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.as_str())
            .collect()
    }
}

/// Wire format a tool description is rendered in.
///
/// Formats differ only in field names and casing, never in content.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFormat {
    /// Google Gemini function declarations.
    #[default]
    Gemini,
    /// `OpenAI` (and compatible) function tools.
    OpenAi,
    /// Anthropic tool definitions (`input_schema`).
    Anthropic,
}

impl SchemaFormat {
    /// Token naming the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while choosing a schema format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The requested output format is not one of the supported wire formats.
    #[error("unsupported schema format `{token}`")]
    UnsupportedFormat {
        /// Token that was requested.
        token: String,
    },
}

impl FromStr for SchemaFormat {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(SchemaError::UnsupportedFormat {
                token: s.to_owned(),
            }),
        }
    }
}

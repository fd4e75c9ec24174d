//! Turns a model response into an ordered call sequence.
//!
//! Structured function calls are taken as-is. When the model answered in
//! prose instead, each line of the form `name(key="value", ...)` is read as
//! one call. Malformed lines never abort parsing; they surface as
//! [`ParseWarning`]s.

use std::str::FromStr;

use agent_adapters::traits::ModelResponse;
use agent_primitives::CallId;
use agent_tools::arguments::Arguments;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Handle later calls use to reference this call's result.
    pub call_id: CallId,
    /// Tool name as the model wrote it, namespace prefix removed.
    pub name: String,
    /// Arguments in the order the model produced them.
    #[serde(default)]
    pub args: Arguments,
}

impl CallRecord {
    /// Creates a call record.
    #[must_use]
    pub fn new(call_id: impl Into<CallId>, name: impl Into<String>, args: Arguments) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Calls in execution order.
pub type CallSequence = Vec<CallRecord>;

/// How structured calls are keyed in the result store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallIdStrategy {
    /// Zero-based position in the sequence.
    #[default]
    Positional,
    /// The tool name; a repeated name overwrites the earlier result.
    ToolName,
}

impl FromStr for CallIdStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "tool_name" | "name" => Ok(Self::ToolName),
            other => Err(format!("unknown call id strategy `{other}`")),
        }
    }
}

/// A free-text line that was not accepted as a call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseWarning {
    /// The line has no `(` to open an argument list.
    #[error("line {line}: no argument list")]
    NotACall {
        /// One-based line number.
        line: usize,
    },

    /// The name before `(` is not a registered tool.
    #[error("line {line}: unknown tool `{name}`")]
    UnknownTool {
        /// One-based line number.
        line: usize,
        /// Candidate name after namespace stripping.
        name: String,
    },

    /// No `)` follows the opening parenthesis.
    #[error("line {line}: unclosed argument list")]
    Unclosed {
        /// One-based line number.
        line: usize,
    },

    /// An argument is not of the form `key=value`.
    #[error("line {line}: argument `{pair}` lacks `=`")]
    MissingEquals {
        /// One-based line number.
        line: usize,
        /// Offending fragment.
        pair: String,
    },
}

/// Parsed sequence plus the warnings collected along the way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedCalls {
    /// Accepted calls in order.
    pub sequence: CallSequence,
    /// Entries that were dropped.
    pub warnings: Vec<ParseWarning>,
}

/// Converts model responses into call sequences.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallParser {
    strategy: CallIdStrategy,
}

impl CallParser {
    /// Creates a parser keying structured calls with `strategy`.
    #[must_use]
    pub const fn new(strategy: CallIdStrategy) -> Self {
        Self { strategy }
    }

    /// Returns the configured id strategy.
    #[must_use]
    pub const fn strategy(&self) -> CallIdStrategy {
        self.strategy
    }

    /// Parses a model response. Structured calls win over text when both
    /// are present; `known_tools` only filters free-text lines.
    #[must_use]
    pub fn parse(&self, response: &ModelResponse, known_tools: &[&str]) -> ParsedCalls {
        if response.function_calls.is_empty() {
            parse_text(&response.text, known_tools)
        } else {
            ParsedCalls {
                sequence: self.parse_structured(response),
                warnings: Vec::new(),
            }
        }
    }

    fn parse_structured(&self, response: &ModelResponse) -> CallSequence {
        response
            .function_calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                let call_id = match self.strategy {
                    CallIdStrategy::Positional => CallId::positional(index),
                    CallIdStrategy::ToolName => CallId::new(call.name.as_str()),
                };
                CallRecord::new(call_id, call.name.as_str(), call.args.clone())
            })
            .collect()
    }
}

/// Parses free text, one call per non-blank line. Accepted lines are keyed
/// by their position among accepted lines.
#[must_use]
pub fn parse_text(text: &str, known_tools: &[&str]) -> ParsedCalls {
    let mut parsed = ParsedCalls::default();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(index + 1, line, known_tools) {
            Ok((name, args)) => {
                let call_id = CallId::positional(parsed.sequence.len());
                debug!(%call_id, tool = %name, "parsed free-text call");
                parsed.sequence.push(CallRecord::new(call_id, name, args));
            }
            Err(warning) => {
                warn!(%warning, "skipping free-text entry");
                parsed.warnings.push(warning);
            }
        }
    }

    parsed
}

fn parse_line(
    line_no: usize,
    line: &str,
    known_tools: &[&str],
) -> Result<(String, Arguments), ParseWarning> {
    let open = line
        .find('(')
        .ok_or(ParseWarning::NotACall { line: line_no })?;

    let candidate = line[..open].trim();
    let name = candidate
        .rsplit_once('.')
        .map_or(candidate, |(_, tail)| tail)
        .trim();
    if !known_tools.contains(&name) {
        return Err(ParseWarning::UnknownTool {
            line: line_no,
            name: name.to_owned(),
        });
    }

    let close = line
        .rfind(')')
        .filter(|close| *close > open)
        .ok_or(ParseWarning::Unclosed { line: line_no })?;

    let mut args = Arguments::new();
    for pair in split_top_level(&line[open + 1..close]) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| ParseWarning::MissingEquals {
            line: line_no,
            pair: pair.to_owned(),
        })?;
        args.insert(
            strip_quotes(key).to_owned(),
            Value::String(strip_quotes(value).to_owned()),
        );
    }

    Ok((name.to_owned(), args))
}

/// Splits on commas that sit outside quotes and brackets.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '{' | '(') => depth += 1,
            (None, ']' | '}' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

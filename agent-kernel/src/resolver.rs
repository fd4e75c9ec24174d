//! Dependency resolution and argument mapping for a single call.

use agent_primitives::{CallId, CapabilityDescriptor, DeclaredType};
use agent_tools::arguments::Arguments;
use agent_tools::registry::ArgumentAliases;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use crate::parser::CallRecord;

const REFERENCE_PREFIX: &str = "<result_from_";
const REFERENCE_SUFFIX: &str = ">";

/// Results of the calls executed so far in one pass, keyed by call id.
///
/// Storing under an existing id replaces the earlier value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultStore {
    values: Map<String, Value>,
}

impl ResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `call_id`.
    pub fn insert(&mut self, call_id: &CallId, value: Value) {
        self.values.insert(call_id.as_str().to_owned(), value);
    }

    /// Returns the value stored for `call_id`.
    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<&Value> {
        self.values.get(call_id)
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Values published by capabilities that provide context, such as the
/// working directory, for contextual parameters of later calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AmbientContext {
    values: Map<String, Value>,
}

impl AmbientContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Returns the value published under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns `true` when nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Errors produced while resolving a call's arguments.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// A back-reference names a call that has no stored result.
    #[error("call {call_id} references `{reference}`, which has no result yet")]
    MissingDependency {
        /// Call whose argument could not be resolved.
        call_id: CallId,
        /// Referenced call id.
        reference: String,
    },
}

/// Result alias for argument resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Returns the referenced call id when `value` is exactly `<result_from_X>`.
#[must_use]
pub fn back_reference(value: &str) -> Option<&str> {
    value
        .strip_prefix(REFERENCE_PREFIX)?
        .strip_suffix(REFERENCE_SUFFIX)
        .filter(|reference| !reference.is_empty())
}

/// Produces the arguments a capability is invoked with.
///
/// Keys are renamed through `aliases`, back-references are replaced by
/// stored results, then, when the capability is known, lone strings bound
/// for list parameters are wrapped and missing contextual parameters are
/// filled from `ambient`.
///
/// # Errors
///
/// Returns [`ResolveError::MissingDependency`] when a back-reference points
/// at a call id absent from `store`.
pub fn resolve_arguments(
    record: &CallRecord,
    descriptor: Option<&CapabilityDescriptor>,
    aliases: &ArgumentAliases,
    store: &ResultStore,
    ambient: &AmbientContext,
) -> ResolveResult<Arguments> {
    let mut args = Arguments::new();

    for (key, value) in &record.args {
        let canonical = aliases.canonical(key);
        let value = match value.as_str().and_then(back_reference) {
            Some(reference) => store
                .get(reference)
                .cloned()
                .ok_or_else(|| ResolveError::MissingDependency {
                    call_id: record.call_id.clone(),
                    reference: reference.to_owned(),
                })?,
            None => value.clone(),
        };
        args.insert(canonical.to_owned(), value);
    }

    let Some(descriptor) = descriptor else {
        return Ok(args);
    };

    for param in descriptor.params() {
        if param.declared_type() == DeclaredType::List {
            if let Some(value) = args.get_mut(param.name()).filter(|value| value.is_string()) {
                *value = Value::Array(vec![value.take()]);
            }
        }

        if param.is_contextual() && !args.contains_key(param.name()) {
            if let Some(value) = ambient.get(param.name()) {
                trace!(call_id = %record.call_id, param = param.name(), "injecting ambient value");
                args.insert(param.name().to_owned(), value.clone());
            }
        }
    }

    Ok(args)
}

//! Sequential execution of a call sequence against the capability registry.
//!
//! A pass walks the sequence in order and awaits each capability before the
//! next call starts. A failing capability or an unknown tool only affects its
//! own call; a back-reference to a result that does not exist aborts the rest
//! of the pass, and the caller receives the partial [`DispatchReport`] inside
//! [`DispatchAborted`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agent_primitives::{CallId, PassId};
use agent_tools::arguments::Arguments;
use agent_tools::registry::{CapabilityRegistry, ToolError};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::parser::{CallRecord, CallSequence};
use crate::resolver::{AmbientContext, ResolveError, ResultStore, resolve_arguments};
use crate::state::{CallState, CallTracker};

/// Default bound on nested task lists.
pub const DEFAULT_MAX_TASK_DEPTH: usize = 4;

/// What happened to a call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CallOutcome {
    /// The capability returned a value.
    Succeeded(Value),
    /// The capability returned an error.
    Failed(String),
    /// No capability is registered under the call's name.
    UnknownTool,
    /// An identical call already ran as a sub-task earlier in the pass.
    Folded,
}

/// Report line for one call.
#[derive(Clone, Debug)]
pub struct DispatchEntry {
    tracker: CallTracker,
    name: String,
    outcome: Option<CallOutcome>,
}

impl DispatchEntry {
    fn pending(call_id: CallId, name: String) -> Self {
        Self {
            tracker: CallTracker::new(call_id),
            name,
            outcome: None,
        }
    }

    fn settle(&mut self, state: CallState, outcome: CallOutcome) {
        if let Err(err) = self.tracker.advance(state) {
            error!(%err, "call settled twice");
            return;
        }
        self.outcome = Some(outcome);
    }

    /// Returns the call id.
    #[must_use]
    pub const fn call_id(&self) -> &CallId {
        self.tracker.call_id()
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the final state; [`CallState::Pending`] when the pass aborted
    /// before the call ran.
    #[must_use]
    pub const fn state(&self) -> CallState {
        self.tracker.state()
    }

    /// Returns the outcome once the call has settled.
    #[must_use]
    pub const fn outcome(&self) -> Option<&CallOutcome> {
        self.outcome.as_ref()
    }
}

/// Everything one pass produced.
#[derive(Clone, Debug)]
pub struct DispatchReport {
    pass_id: PassId,
    entries: Vec<DispatchEntry>,
    results: ResultStore,
    context: AmbientContext,
}

impl DispatchReport {
    /// Returns the pass identifier.
    #[must_use]
    pub const fn pass_id(&self) -> PassId {
        self.pass_id
    }

    /// Entries in execution order; sub-tasks follow the call that yielded
    /// them, calls never attempted trail as pending.
    #[must_use]
    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    /// Looks up the entry for `call_id`; the latest one wins when ids repeat.
    #[must_use]
    pub fn entry(&self, call_id: &str) -> Option<&DispatchEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.call_id().as_str() == call_id)
    }

    /// Results of the calls that succeeded.
    #[must_use]
    pub const fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Ambient context as it stood at the end of the pass.
    #[must_use]
    pub const fn context(&self) -> &AmbientContext {
        &self.context
    }

    /// Number of entries in `state`.
    #[must_use]
    pub fn count(&self, state: CallState) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state() == state)
            .count()
    }
}

/// The pass stopped at an unresolvable back-reference.
#[derive(Debug, Error)]
#[error("dispatch pass {} aborted: {source}", .report.pass_id)]
pub struct DispatchAborted {
    /// The resolution failure that stopped the pass.
    pub source: ResolveError,
    /// State of the pass when it stopped.
    pub report: Box<DispatchReport>,
}

impl DispatchAborted {
    /// Consumes the error, returning the partial report.
    #[must_use]
    pub fn into_report(self) -> DispatchReport {
        *self.report
    }
}

/// Mutable state of one pass.
struct Pass {
    pass_id: PassId,
    entries: Vec<DispatchEntry>,
    results: ResultStore,
    context: AmbientContext,
    subtasks: Vec<(String, Arguments)>,
}

impl Pass {
    fn into_report(self) -> DispatchReport {
        DispatchReport {
            pass_id: self.pass_id,
            entries: self.entries,
            results: self.results,
            context: self.context,
        }
    }

    fn ran_as_subtask(&self, name: &str, args: &Arguments) -> bool {
        self.subtasks
            .iter()
            .any(|(done, done_args)| done == name && done_args == args)
    }
}

/// Executes call sequences against a registry.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    max_task_depth: usize,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            max_task_depth: DEFAULT_MAX_TASK_DEPTH,
        }
    }

    /// Bounds how deeply task lists may nest; `0` disables expansion.
    #[must_use]
    pub fn with_max_task_depth(mut self, depth: usize) -> Self {
        self.max_task_depth = depth;
        self
    }

    /// Returns the registry calls are dispatched against.
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Runs one pass over `sequence` with an empty ambient context.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchAborted`] when a back-reference cannot be resolved.
    pub async fn dispatch(&self, sequence: CallSequence) -> Result<DispatchReport, DispatchAborted> {
        self.dispatch_with_context(sequence, AmbientContext::new())
            .await
    }

    /// Runs one pass over `sequence`, seeding the ambient context.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchAborted`] when a back-reference cannot be resolved.
    pub async fn dispatch_with_context(
        &self,
        sequence: CallSequence,
        context: AmbientContext,
    ) -> Result<DispatchReport, DispatchAborted> {
        let mut pass = Pass {
            pass_id: PassId::random(),
            entries: Vec::with_capacity(sequence.len()),
            results: ResultStore::new(),
            context,
            subtasks: Vec::new(),
        };
        info!(pass_id = %pass.pass_id, calls = sequence.len(), "dispatch pass started");

        match self.run(&mut pass, sequence, 0).await {
            Ok(()) => {
                let report = pass.into_report();
                info!(
                    pass_id = %report.pass_id,
                    executed = report.count(CallState::Executed),
                    skipped = report.count(CallState::Skipped),
                    "dispatch pass finished"
                );
                Ok(report)
            }
            Err(source) => {
                warn!(pass_id = %pass.pass_id, %source, "dispatch pass aborted");
                Err(DispatchAborted {
                    source,
                    report: Box::new(pass.into_report()),
                })
            }
        }
    }

    fn run<'a>(
        &'a self,
        pass: &'a mut Pass,
        sequence: CallSequence,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), ResolveError>> {
        Box::pin(async move {
            let mut remaining = sequence.into_iter();
            while let Some(record) = remaining.next() {
                if let Err(err) = self.dispatch_one(pass, record, depth).await {
                    pass.entries.extend(
                        remaining.map(|record| DispatchEntry::pending(record.call_id, record.name)),
                    );
                    return Err(err);
                }
            }
            Ok(())
        })
    }

    async fn dispatch_one(
        &self,
        pass: &mut Pass,
        record: CallRecord,
        depth: usize,
    ) -> Result<(), ResolveError> {
        let slot = pass.entries.len();
        pass.entries
            .push(DispatchEntry::pending(record.call_id.clone(), record.name.clone()));

        let capability = self.registry.get(&record.name).ok();
        let descriptor = capability.map(|capability| capability.descriptor());
        let args = resolve_arguments(
            &record,
            descriptor,
            self.registry.aliases(),
            &pass.results,
            &pass.context,
        )?;

        let Some(capability) = capability else {
            warn!(
                pass_id = %pass.pass_id,
                call_id = %record.call_id,
                tool = %record.name,
                "unknown tool, skipping call"
            );
            pass.entries[slot].settle(CallState::Skipped, CallOutcome::UnknownTool);
            return Ok(());
        };

        if depth == 0 && pass.ran_as_subtask(&record.name, &args) {
            info!(
                pass_id = %pass.pass_id,
                call_id = %record.call_id,
                tool = %record.name,
                "call already ran as a sub-task"
            );
            pass.entries[slot].settle(CallState::Skipped, CallOutcome::Folded);
            return Ok(());
        }

        debug!(
            pass_id = %pass.pass_id,
            call_id = %record.call_id,
            tool = %record.name,
            depth,
            "invoking capability"
        );

        let outcome = AssertUnwindSafe(capability.invoke(args.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ToolError::execution(format!(
                    "capability panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                let shown = Value::Object(args);
                warn!(
                    pass_id = %pass.pass_id,
                    call_id = %record.call_id,
                    tool = %record.name,
                    args = %shown,
                    %err,
                    "capability failed"
                );
                pass.entries[slot].settle(CallState::Executed, CallOutcome::Failed(err.to_string()));
                return Ok(());
            }
        };

        let descriptor = capability.descriptor();
        if let Some(key) = descriptor.provides_context() {
            pass.context.insert(key, value.clone());
        }
        pass.results.insert(&record.call_id, value.clone());
        if depth > 0 {
            pass.subtasks.push((record.name.clone(), args));
        }
        pass.entries[slot].settle(CallState::Executed, CallOutcome::Succeeded(value.clone()));
        info!(
            pass_id = %pass.pass_id,
            call_id = %record.call_id,
            tool = %record.name,
            "call executed"
        );

        if descriptor.yields_tasks() {
            if depth >= self.max_task_depth {
                warn!(
                    pass_id = %pass.pass_id,
                    call_id = %record.call_id,
                    max_task_depth = self.max_task_depth,
                    "task list not expanded, depth limit reached"
                );
            } else {
                let tasks = decode_tasks(&record.call_id, &value);
                debug!(
                    pass_id = %pass.pass_id,
                    call_id = %record.call_id,
                    tasks = tasks.len(),
                    "dispatching task list"
                );
                self.run(pass, tasks, depth + 1).await?;
            }
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

/// Reads a `[{name, args}]` task list; malformed entries are skipped.
fn decode_tasks(parent: &CallId, value: &Value) -> CallSequence {
    let Some(items) = value.as_array() else {
        warn!(call_id = %parent, "task list is not an array");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                warn!(call_id = %parent, index, "task entry has no name");
                return None;
            };
            let args = match item.get("args") {
                None | Some(Value::Null) => Arguments::new(),
                Some(Value::Object(args)) => args.clone(),
                Some(_) => {
                    warn!(call_id = %parent, index, "task entry args are not an object");
                    return None;
                }
            };
            Some(CallRecord::new(parent.child(index), name, args))
        })
        .collect()
}

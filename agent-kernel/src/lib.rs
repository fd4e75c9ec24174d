//! Call pipeline: parse the model's answer, resolve inter-call references,
//! and dispatch each call against the capability registry.
//!
//! [`parser`] turns a [`ModelResponse`](agent_adapters::traits::ModelResponse)
//! into a [`CallSequence`], [`resolver`] maps arguments and substitutes
//! earlier results, and [`dispatcher`] runs the sequence one call at a time.
//! [`orchestrator`] strings these together behind a model adapter and
//! [`schedule`] repeats a job daily.

#![warn(missing_docs, clippy::pedantic)]

pub mod dispatcher;
pub mod orchestrator;
pub mod parser;
pub mod resolver;
pub mod schedule;
pub mod state;

pub use dispatcher::{
    CallOutcome, DEFAULT_MAX_TASK_DEPTH, DispatchAborted, DispatchEntry, DispatchReport,
    Dispatcher,
};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorResult, RunOutcome};
pub use parser::{
    CallIdStrategy, CallParser, CallRecord, CallSequence, ParseWarning, ParsedCalls, parse_text,
};
pub use resolver::{
    AmbientContext, ResolveError, ResolveResult, ResultStore, back_reference, resolve_arguments,
};
pub use schedule::{DailySchedule, ScheduleError, ScheduleResult};
pub use state::{CallState, CallTracker, StateError, StateResult};

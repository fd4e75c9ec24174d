//! Model adapters used by the orchestrator.
//!
//! Each module exposes an implementation for a specific provider while sharing
//! a common trait-based interface defined in [`traits`]. Adapters send the
//! rendered tool descriptions along with the prompt and hand back whatever
//! mix of function calls and free text the model produced.

#![warn(missing_docs, clippy::pedantic)]

pub mod gemini;
pub mod openai;
pub mod traits;

mod http_client;

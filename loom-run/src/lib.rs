//! The promptloom run pipeline.
//!
//! One run is a single-threaded cooperative sequence: build the variable
//! environment, expand the main template, resolve system templates and
//! request parameters, issue exactly one chat completion, extract file and
//! summary blocks from the reply, and synthesize edits. Script failures
//! short-circuit before the completion call and surface through the trace;
//! transport failures are the only errors re-raised to the caller.

#![warn(missing_docs, clippy::pedantic)]

mod options;
mod pipeline;

/// Per-run options.
pub use options::RunOptions;
/// The runner, its outcome, and its error type.
pub use pipeline::{RunError, RunOutcome, Runner};

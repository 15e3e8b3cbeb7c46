//! Template expansion engine for promptloom.
//!
//! The engine turns a template, a document fragment, and a variable binding
//! environment into a final prompt string plus a Markdown trace. Failures
//! inside template scripts degrade into diagnostics rather than aborting the
//! run; the trace is the artifact a human reads afterwards.

#![warn(missing_docs, clippy::pedantic)]

mod env;
mod error;
mod expand;
mod system;
mod trace;

/// Variable binding table and environment construction.
pub use env::{Bindings, CLIPBOARD_VAR, EnvBuilder, category_matches};
/// Engine error type and result alias.
pub use error::{EngineError, EngineResult};
/// Script expansion: the expander and its structured result.
pub use expand::{ERROR_MARKER, Expansion, expand};
/// System-template resolution and request parameter precedence.
pub use system::{
    CANONICAL_SYSTEM, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, NO_SYSTEM,
    RequestParams, ResolvedSystem, SystemSection, resolve_system,
};
/// The run trace: ordered Markdown sections rendered once.
pub use trace::Trace;

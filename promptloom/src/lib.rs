//! Prompt-templating and LLM-orchestration toolkit facade.
//!
//! Depend on this crate via `cargo add promptloom`. It bundles the internal
//! workspace crates behind feature flags so downstream users can enable or
//! disable layers as needed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export the document and template model for convenience.
pub use loom_primitives as primitives;

/// Template expansion engine (enabled by `engine` feature).
#[cfg(feature = "engine")]
pub use loom_engine as engine;

/// Chat-completion transports (enabled by `transport` feature).
#[cfg(feature = "transport")]
pub use loom_transport as transport;

/// Response extraction and edit synthesis (enabled by `extract` feature).
#[cfg(feature = "extract")]
pub use loom_extract as extract;

/// The run pipeline (enabled by `run` feature).
#[cfg(feature = "run")]
pub use loom_run as run;

//! Chat-completion transport layer.
//!
//! The run pipeline talks to a model through the [`ChatTransport`] trait:
//! one request in, raw completion text out, with structured request errors
//! and cooperative cancellation. A hyper-based transport for the Anthropic
//! Messages API ships in [`anthropic`]; callers with their own plumbing
//! implement the trait instead.

#![warn(missing_docs, clippy::pedantic)]

pub mod anthropic;
mod traits;

/// Transport contract and shared request/error types.
pub use traits::{
    ChatMessage, ChatRole, ChatTransport, CompletionRequest, ErrorBody, TransportError,
    TransportResult,
};

//! Shared transport traits and data structures.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result alias used by transport implementations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Structured body of a provider error response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Provider-supplied error message.
    #[serde(default)]
    pub message: Option<String>,
    /// Provider-supplied error type.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Provider-supplied error code.
    #[serde(default)]
    pub code: Option<String>,
}

/// Error type shared by transport implementations.
///
/// Transport failures are the only error class the run pipeline re-raises to
/// its caller; everything upstream degrades into trace diagnostics instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider rejected the request.
    #[error("request failed with status {status} {status_text}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// HTTP status text.
        status_text: String,
        /// Parsed provider error body, when one was returned.
        body: Option<ErrorBody>,
    },

    /// The run's cancellation signal fired before a reply arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The transport is misconfigured or missing credentials.
    #[error("transport not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// Any other transport-level failure (network, protocol, decoding).
    #[error("transport error: {reason}")]
    Other {
        /// Additional context about the error.
        reason: String,
    },
}

impl TransportError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for miscellaneous failures.
    #[must_use]
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }
}

/// Roles supported in chat-style requests.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System messages steer the assistant behaviour.
    System,
    /// User-authored content.
    User,
    /// Assistant (model) responses.
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// One message in a chat-style request.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    role: ChatRole,
    content: String,
}

impl ChatMessage {
    /// Creates a new chat message.
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Returns the message role.
    #[must_use]
    pub const fn role(&self) -> ChatRole {
        self.role
    }

    /// Returns the message content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A single chat-completion request with fully resolved parameters.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CompletionRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    #[serde(default)]
    system: String,
    user: String,
}

impl CompletionRequest {
    /// Creates a request from resolved parameters and prompt texts.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
            system: system.into(),
            user: user.into(),
        }
    }

    /// Returns the model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the completion token ceiling.
    #[must_use]
    pub const fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Returns the combined system-prompt text.
    #[must_use]
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Returns the user-prompt text.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the request as role-tagged messages.
    ///
    /// An empty system prompt is omitted; transports that carry the system
    /// prompt out-of-band (as the bundled one does) use the accessors
    /// directly instead.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if !self.system.is_empty() {
            messages.push(ChatMessage::new(ChatRole::System, self.system.clone()));
        }
        messages.push(ChatMessage::new(ChatRole::User, self.user.clone()));
        messages
    }
}

/// Trait implemented by chat-completion transports.
///
/// Implementations issue exactly one provider call per invocation and do not
/// retry; retry and backoff policy belongs to the transport's own plumbing
/// or the caller, never to the run pipeline.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issues one chat completion, returning the raw completion text.
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> TransportResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_system_when_present() {
        let request = CompletionRequest::new("m", 0.2, 64, "sys", "hello");
        let messages = request.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role(), ChatRole::System);
        assert_eq!(messages[1].content(), "hello");
    }

    #[test]
    fn messages_omit_empty_system() {
        let request = CompletionRequest::new("m", 0.2, 64, "", "hello");
        let messages = request.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), ChatRole::User);
    }

    #[test]
    fn error_body_parses_provider_shape() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"message":"too long","type":"invalid_request_error"}"#)
                .unwrap();
        assert_eq!(body.message.as_deref(), Some("too long"));
        assert_eq!(body.kind.as_deref(), Some("invalid_request_error"));
        assert!(body.code.is_none());
    }
}

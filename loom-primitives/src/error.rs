//! Shared error definitions for the document and template model.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the model crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing model values.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided run identifier could not be parsed.
    #[error("invalid run id: {source}")]
    InvalidRunId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Template definition failed validation.
    #[error("invalid template: {reason}")]
    InvalidTemplate {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Fragment definition failed validation.
    #[error("invalid fragment: {reason}")]
    InvalidFragment {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

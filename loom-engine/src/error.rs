//! Engine error definitions.

use loom_primitives::FragmentId;
use thiserror::Error;

/// Result alias used by the engine.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors the engine can return to the pipeline.
///
/// Script-level failures are not errors here: they are recorded inside
/// [`crate::Expansion`] and the trace. These variants cover broken
/// preconditions the run cannot continue past.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested fragment id is not present in the project arena.
    #[error("unknown fragment {id}")]
    UnknownFragment {
        /// The offending fragment id.
        id: FragmentId,
    },

    /// A fragment's owning file is not tracked by the project.
    #[error("file `{filename}` is not tracked by the project")]
    MissingFile {
        /// The missing filename.
        filename: String,
    },

    /// The implicit canonical system template resolved nothing.
    #[error("canonical system template `system` is missing from the project")]
    CanonicalSystemMissing,
}

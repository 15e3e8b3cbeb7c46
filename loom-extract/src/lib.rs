//! Completion-output post-processing.
//!
//! The model replies with named fenced blocks: `File <name>` blocks carry
//! file content, a `SUMMARY` block carries the run summary, and whatever
//! remains becomes the output text. This crate parses those blocks, resolves
//! file blocks against the fragment's directory, and turns them into
//! create/replace/insert edit descriptions for the caller to apply — it
//! never writes files itself.

#![warn(missing_docs, clippy::pedantic)]

mod blocks;
mod edits;
mod extract;

/// Named-block parsing over raw completion text.
pub use blocks::{NamedBlock, parse_named_blocks};
/// Edit types, the file-store seam, and edit synthesis.
pub use edits::{
    Edit, EditError, FileEdit, FileEdits, FileStore, MemoryFileStore, TokioFileStore,
    synthesize_edits,
};
/// Response extraction: file blocks, summary, and output text.
pub use extract::{Extraction, FILE_PREFIX, FileBlock, SUMMARY_NAME, extract_response};

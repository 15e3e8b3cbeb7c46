//! Edit synthesis.
//!
//! Turns resolved file-content blocks into structured edit descriptions
//! against the current file-system state. Edits are only ever produced here;
//! applying them is the caller's job.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use loom_primitives::{Fragment, resolve_relative};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::extract::FileBlock;

/// A structured description of one file mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edit {
    /// Replace a byte range of an existing file.
    Replace {
        /// Absolute target filename.
        filename: String,
        /// Human-readable label for the edit.
        label: String,
        /// Byte range to replace.
        range: Range<usize>,
        /// Replacement text.
        text: String,
    },
    /// Create a new file.
    Create {
        /// Absolute target filename.
        filename: String,
        /// Human-readable label for the edit.
        label: String,
        /// Initial file content.
        text: String,
        /// Whether an existing file may be clobbered by the caller.
        overwrite: bool,
    },
    /// Insert text at a byte offset.
    Insert {
        /// Absolute target filename.
        filename: String,
        /// Human-readable label for the edit.
        label: String,
        /// Byte offset of the insertion point.
        offset: usize,
        /// Text to insert.
        text: String,
    },
}

/// Before/after content for one touched file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Previous content; absent for newly created files.
    pub before: Option<String>,
    /// New content.
    pub after: String,
}

/// Map from absolute filename to its before/after record.
pub type FileEdits = BTreeMap<String, FileEdit>;

/// Errors during edit synthesis.
#[derive(Debug, Error)]
pub enum EditError {
    /// An existing target file could not be read.
    #[error("failed to read `{filename}`: {source}")]
    Read {
        /// The unreadable filename.
        filename: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Read-only file-system view used during edit synthesis.
///
/// Reads are not locked; coordinating concurrent runs against the same
/// files is the caller's responsibility.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Returns whether a file exists at the given absolute path.
    async fn file_exists(&self, path: &str) -> bool;

    /// Reads the full text of the file at the given absolute path.
    async fn read_text(&self, path: &str) -> std::io::Result<String>;
}

/// [`FileStore`] backed by the real file system via tokio.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioFileStore;

#[async_trait]
impl FileStore for TokioFileStore {
    async fn file_exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_text(&self, path: &str) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// In-memory [`FileStore`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryFileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a file.
    ///
    /// # Panics
    ///
    /// Panics when the internal lock is poisoned.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files
            .write()
            .expect("file store lock poisoned")
            .insert(path.into(), content.into());
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn file_exists(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    async fn read_text(&self, path: &str) -> std::io::Result<String> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_owned()))
    }
}

/// Synthesizes edits for the extracted file blocks.
///
/// An existing target with different content yields a whole-file replace; an
/// identical target yields nothing; a missing target yields a create. A
/// created or changed file the fragment does not already reference also
/// queues an insert appending a Markdown link at the end of the fragment's
/// range — a discoverability aid for the surrounding document.
///
/// # Errors
///
/// Returns [`EditError::Read`] when an existing target file cannot be read.
pub async fn synthesize_edits(
    files: &[FileBlock],
    fragment: &Fragment,
    store: &dyn FileStore,
) -> Result<(Vec<Edit>, FileEdits), EditError> {
    let fragment_dir = Path::new(fragment.filename())
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let referenced: Vec<String> = fragment
        .references()
        .iter()
        .map(|reference| resolve_relative(fragment_dir, reference))
        .collect();

    let mut edits = Vec::new();
    let mut file_edits = FileEdits::new();

    for block in files {
        let touched = if store.file_exists(&block.path).await {
            let before = store
                .read_text(&block.path)
                .await
                .map_err(|source| EditError::Read {
                    filename: block.path.clone(),
                    source,
                })?;
            if before == block.text {
                debug!(path = %block.path, "content unchanged, no edit");
                false
            } else {
                edits.push(Edit::Replace {
                    filename: block.path.clone(),
                    label: block.label.clone(),
                    range: 0..before.len(),
                    text: block.text.clone(),
                });
                file_edits.insert(
                    block.path.clone(),
                    FileEdit {
                        before: Some(before),
                        after: block.text.clone(),
                    },
                );
                true
            }
        } else {
            edits.push(Edit::Create {
                filename: block.path.clone(),
                label: block.label.clone(),
                text: block.text.clone(),
                overwrite: true,
            });
            file_edits.insert(
                block.path.clone(),
                FileEdit {
                    before: None,
                    after: block.text.clone(),
                },
            );
            true
        };

        if touched && !referenced.contains(&block.path) {
            edits.push(Edit::Insert {
                filename: fragment.filename().to_owned(),
                label: block.label.clone(),
                offset: fragment.range().end,
                text: format!("\n{}", markdown_link(fragment_dir, &block.path)),
            });
        }
    }

    Ok((edits, file_edits))
}

/// Renders a Markdown link to a target path, relative to `base_dir` when the
/// target lives beneath it.
fn markdown_link(base_dir: &Path, target: &str) -> String {
    let name = Path::new(target)
        .file_name()
        .map_or_else(|| target.to_owned(), |n| n.to_string_lossy().into_owned());
    let href = Path::new(target)
        .strip_prefix(base_dir)
        .map_or_else(|_| target.to_owned(), |rel| format!("./{}", rel.display()));
    format!("[{name}]({href})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment() -> Fragment {
        Fragment::builder("/work/doc.md")
            .range(10..40)
            .add_reference("./known.txt")
            .build()
            .unwrap()
    }

    fn block(path: &str, text: &str) -> FileBlock {
        FileBlock {
            path: path.to_owned(),
            label: format!("File {path}"),
            text: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn missing_target_yields_a_create_edit() {
        let store = MemoryFileStore::new();
        let (edits, file_edits) = synthesize_edits(&[block("/work/a.txt", "alpha")], &fragment(), &store)
            .await
            .unwrap();

        assert!(matches!(
            &edits[0],
            Edit::Create { filename, text, overwrite: true, .. }
                if filename == "/work/a.txt" && text == "alpha"
        ));
        let record = &file_edits["/work/a.txt"];
        assert!(record.before.is_none());
        assert_eq!(record.after, "alpha");
    }

    #[tokio::test]
    async fn changed_target_yields_a_whole_file_replace() {
        let store = MemoryFileStore::new();
        store.insert("/work/a.txt", "old content");
        let (edits, file_edits) = synthesize_edits(&[block("/work/a.txt", "new content")], &fragment(), &store)
            .await
            .unwrap();

        assert!(matches!(
            &edits[0],
            Edit::Replace { range, text, .. }
                if *range == (0.."old content".len()) && text == "new content"
        ));
        assert_eq!(
            file_edits["/work/a.txt"].before.as_deref(),
            Some("old content")
        );
    }

    #[tokio::test]
    async fn identical_content_is_a_no_op() {
        let store = MemoryFileStore::new();
        store.insert("/work/a.txt", "same");
        let (edits, file_edits) = synthesize_edits(&[block("/work/a.txt", "same")], &fragment(), &store)
            .await
            .unwrap();

        assert!(edits.is_empty());
        assert!(file_edits.is_empty());
    }

    #[tokio::test]
    async fn unreferenced_new_file_queues_a_link_insert() {
        let store = MemoryFileStore::new();
        let (edits, _) = synthesize_edits(&[block("/work/new.txt", "n")], &fragment(), &store)
            .await
            .unwrap();

        let insert = edits
            .iter()
            .find_map(|edit| match edit {
                Edit::Insert { filename, offset, text, .. } => Some((filename, offset, text)),
                _ => None,
            })
            .expect("link insert queued");
        assert_eq!(insert.0, "/work/doc.md");
        assert_eq!(*insert.1, 40);
        assert_eq!(insert.2, "\n[new.txt](./new.txt)");
    }

    #[tokio::test]
    async fn referenced_file_gets_no_link_insert() {
        let store = MemoryFileStore::new();
        let (edits, _) = synthesize_edits(&[block("/work/known.txt", "k")], &fragment(), &store)
            .await
            .unwrap();

        assert!(edits.iter().all(|edit| !matches!(edit, Edit::Insert { .. })));
        assert!(edits.iter().any(|edit| matches!(edit, Edit::Create { .. })));
    }

    #[tokio::test]
    async fn unreadable_target_surfaces_a_read_error() {
        struct BrokenStore;

        #[async_trait]
        impl FileStore for BrokenStore {
            async fn file_exists(&self, _path: &str) -> bool {
                true
            }

            async fn read_text(&self, path: &str) -> std::io::Result<String> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    path.to_owned(),
                ))
            }
        }

        let err = synthesize_edits(&[block("/work/a.txt", "x")], &fragment(), &BrokenStore)
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Read { .. }));
    }
}

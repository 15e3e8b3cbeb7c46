//! Lexical path resolution for file references.

use std::path::{Component, Path, PathBuf};

/// Resolves a file reference against a base directory.
///
/// A leading `./` is stripped before resolution. Absolute references are
/// normalized as-is; relative references are joined onto `base_dir` first.
/// Normalization is purely lexical: `.` components are dropped and `..`
/// components pop their parent without consulting the file system.
#[must_use]
pub fn resolve_relative(base_dir: &Path, reference: &str) -> String {
    let reference = reference.trim();
    let reference = reference.strip_prefix("./").unwrap_or(reference);

    let candidate = if Path::new(reference).is_absolute() {
        PathBuf::from(reference)
    } else {
        base_dir.join(reference)
    };

    normalize(&candidate).to_string_lossy().into_owned()
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

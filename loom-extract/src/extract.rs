//! Response extraction.

use std::path::Path;

use loom_primitives::resolve_relative;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocks::parse_named_blocks;

/// Prefix marking a block name as file content.
pub const FILE_PREFIX: &str = "File ";

/// Block name carrying the run summary.
pub const SUMMARY_NAME: &str = "SUMMARY";

/// A file-content block resolved to an absolute path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlock {
    /// Absolute target path.
    pub path: String,
    /// The original block label.
    pub label: String,
    /// The file content carried by the block.
    pub text: String,
}

/// Result of post-processing one completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// File-content blocks, in response order.
    pub files: Vec<FileBlock>,
    /// The `SUMMARY` block, when present.
    pub summary: Option<String>,
    /// The final output text after consumption and fence unwrapping.
    pub text: String,
    /// Named blocks that were neither file content nor summary.
    pub leftovers: Vec<(String, String)>,
}

/// Extracts file blocks, the summary, and the output text from a completion.
///
/// File blocks resolve against `base_dir`, the directory of the fragment's
/// owning file. After file and summary blocks are consumed, exactly one
/// remaining named block becomes the output text (the single-output
/// convention); otherwise the raw text minus the consumed blocks is used.
/// Either way a single whole-text fence wrapper is stripped.
#[must_use]
pub fn extract_response(raw: &str, base_dir: &Path) -> Extraction {
    let blocks = parse_named_blocks(raw);

    let mut files = Vec::new();
    let mut summary = None;
    let mut leftovers = Vec::new();
    let mut consumed = Vec::new();

    for block in blocks {
        if let Some(rest) = block.name.strip_prefix(FILE_PREFIX) {
            let path = resolve_relative(base_dir, rest.trim());
            debug!(label = %block.name, %path, "file block extracted");
            files.push(FileBlock {
                path,
                label: block.name,
                text: block.text,
            });
            consumed.push(block.span);
        } else if block.name == SUMMARY_NAME {
            if summary.is_none() {
                summary = Some(block.text);
            }
            consumed.push(block.span);
        } else {
            leftovers.push((block.name, block.text));
        }
    }

    let text = if leftovers.len() == 1 {
        leftovers[0].1.clone()
    } else {
        cut_spans(raw, &consumed).trim().to_owned()
    };

    Extraction {
        files,
        summary,
        text: strip_outer_fence(&text),
        leftovers,
    }
}

/// Removes the given byte spans from the text.
fn cut_spans(raw: &str, spans: &[std::ops::Range<usize>]) -> String {
    let mut sorted: Vec<_> = spans.to_vec();
    sorted.sort_by_key(|span| span.start);

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    for span in sorted {
        if span.start > cursor {
            out.push_str(&raw[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    out.push_str(&raw[cursor..]);
    out
}

/// Strips a single whole-text code fence, when the text is exactly one
/// fenced region with matching open and close markers.
fn strip_outer_fence(text: &str) -> String {
    let trimmed = text.trim();
    let mut lines = trimmed.lines();

    let Some(first) = lines.next() else {
        return trimmed.to_owned();
    };
    let open = first.chars().take_while(|c| *c == '`').count();
    if open < 3 {
        return trimmed.to_owned();
    }
    // Anything after the ticks must be a bare language tag.
    if first[open..].trim().contains(char::is_whitespace) {
        return trimmed.to_owned();
    }

    let body: Vec<&str> = lines.collect();
    let Some(last) = body.last() else {
        return trimmed.to_owned();
    };
    let close = last.trim();
    if close.is_empty() || !close.chars().all(|c| c == '`') || close.len() < open {
        return trimmed.to_owned();
    }
    // An intermediate closing fence means the wrapper is not whole-text.
    if body[..body.len() - 1]
        .iter()
        .any(|line| line.trim().chars().all(|c| c == '`') && line.trim().len() >= open)
    {
        return trimmed.to_owned();
    }

    body[..body.len() - 1].join("\n")
}

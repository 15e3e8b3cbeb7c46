//! Named-block parsing.
//!
//! The wire convention for variable blocks is fixed: a non-blank label line
//! immediately followed by a fenced body. The fence opens with three or more
//! backticks plus an optional language tag and closes with a line of at
//! least as many backticks. Fenced regions without a label are opaque: their
//! contents are never scanned for further labels.

use std::ops::Range;

/// A named block parsed out of raw completion text.
///
/// The span covers the label line through the closing fence, so consumed
/// blocks can be cut from the surrounding text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedBlock {
    /// The trimmed label line.
    pub name: String,
    /// The body between the fences.
    pub text: String,
    /// Byte span of the whole block within the raw text.
    pub span: Range<usize>,
}

/// Parses all top-level named blocks out of raw text.
#[must_use]
pub fn parse_named_blocks(raw: &str) -> Vec<NamedBlock> {
    let lines = line_spans(raw);
    let mut blocks = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let (_, line) = lines[index];

        // An unlabelled fence is skipped wholesale so inner lines cannot be
        // mistaken for labels.
        if let Some(open) = fence_open(line) {
            index = closing_fence(&lines, index + 1, open).map_or(lines.len(), |at| at + 1);
            continue;
        }

        let label = line.trim();
        if label.is_empty() {
            index += 1;
            continue;
        }

        let Some(&(_, next)) = lines.get(index + 1) else {
            break;
        };
        let Some(open) = fence_open(next) else {
            index += 1;
            continue;
        };
        let Some(close) = closing_fence(&lines, index + 2, open) else {
            index += 1;
            continue;
        };

        let body_start = index + 2;
        let body = lines[body_start..close]
            .iter()
            .map(|(_, l)| *l)
            .collect::<Vec<_>>()
            .join("\n");
        let span_start = lines[index].0;
        let span_end = lines[close].0 + lines[close].1.len();
        // Swallow the trailing newline of the closing fence, if any.
        let span_end = if raw[span_end..].starts_with('\n') {
            span_end + 1
        } else {
            span_end
        };

        blocks.push(NamedBlock {
            name: label.to_owned(),
            text: body,
            span: span_start..span_end,
        });
        index = close + 1;
    }

    blocks
}

/// Returns each line paired with its byte offset into the raw text.
fn line_spans(raw: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for line in raw.split('\n') {
        out.push((offset, line));
        offset += line.len() + 1;
    }
    out
}

/// Returns the backtick count when a line opens a fence.
fn fence_open(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let count = trimmed.chars().take_while(|c| *c == '`').count();
    if count >= 3 { Some(count) } else { None }
}

/// Finds the line index of the closing fence for an opener of `open` ticks.
fn closing_fence(lines: &[(usize, &str)], from: usize, open: usize) -> Option<usize> {
    lines[from..].iter().position(|(_, line)| {
        let trimmed = line.trim();
        !trimmed.is_empty() && trimmed.chars().all(|c| c == '`') && trimmed.len() >= open
    }).map(|at| from + at)
}

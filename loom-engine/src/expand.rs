//! Script expansion.
//!
//! A template's script body is a line-oriented prompt script. `{{name}}`
//! placeholders interpolate values from the binding table; `@log` lines feed
//! the diagnostic log buffer; `@emit` flushes the current text segment.
//! Prompt scripts are third-party content: a typo'd variable or a script
//! error must degrade into a visible diagnostic instead of crashing the
//! pipeline, so the expander always returns a structured [`Expansion`].

use tracing::debug;

use crate::Bindings;

/// Marker value that switches an expansion into the failed state.
///
/// When a flushed segment contains this marker, the text following it up to
/// the next line break becomes the fatal error message and all emitted text
/// is discarded. Detection runs after interpolation, so the marker may
/// arrive through a variable value.
pub const ERROR_MARKER: &str = "<<ERROR>>";

/// Structured outcome of one template expansion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expansion {
    /// Produced prompt text; empty when the expansion failed.
    pub text: String,
    /// Accumulated Markdown error lines.
    pub errors: Vec<String>,
    /// Whether the expansion completed without a fatal error. Missing
    /// variables do not clear this flag.
    pub success: bool,
    /// Captured diagnostic log lines, verbatim.
    pub logs: String,
}

impl Expansion {
    /// Returns the accumulated errors as one Markdown fragment.
    #[must_use]
    pub fn errors_markdown(&self) -> String {
        self.errors
            .iter()
            .map(|line| format!("- {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Evaluates a script body against a binding table.
///
/// Never panics and never returns an error: script failures are recorded in
/// the result's `errors` and `success` fields.
#[must_use]
pub fn expand(source: &str, bindings: &Bindings) -> Expansion {
    let mut errors = Vec::new();
    let mut logs = String::new();
    let mut segments: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut fatal: Option<String> = None;

    for (index, line) in source.lines().enumerate() {
        let number = index + 1;
        let stripped = line.trim_start();

        if let Some(directive) = stripped.strip_prefix('@') {
            let (name, rest) = split_directive(directive);
            match name {
                "log" => {
                    let rendered = match interpolate(rest, bindings, number, &mut errors) {
                        Ok(text) => text,
                        Err(error) => {
                            errors.push(error);
                            return failed(errors, logs);
                        }
                    };
                    logs.push_str(rendered.trim_start());
                    logs.push('\n');
                }
                "emit" => {
                    if let Err(message) = flush(&mut current, &mut segments) {
                        fatal = Some(message);
                        break;
                    }
                }
                other => {
                    let column = line.len() - stripped.len() + 1;
                    errors.push(format!(
                        "**unknown directive**: `@{other}` (line {number}, column {column})"
                    ));
                    return failed(errors, logs);
                }
            }
            continue;
        }

        match interpolate(line, bindings, number, &mut errors) {
            Ok(rendered) => {
                let has_marker = rendered.contains(ERROR_MARKER);
                current.push(rendered);
                if has_marker {
                    if let Err(message) = flush(&mut current, &mut segments) {
                        fatal = Some(message);
                        break;
                    }
                }
            }
            Err(error) => {
                errors.push(error);
                return failed(errors, logs);
            }
        }
    }

    if fatal.is_none() {
        if let Err(message) = flush(&mut current, &mut segments) {
            fatal = Some(message);
        }
    }

    if let Some(message) = fatal {
        debug!(%message, "expansion hit error marker");
        errors.push(format!("**template error**: {message}"));
        return failed(errors, logs);
    }

    Expansion {
        text: segments.join("\n\n"),
        errors,
        success: true,
        logs,
    }
}

fn failed(errors: Vec<String>, logs: String) -> Expansion {
    Expansion {
        text: String::new(),
        errors,
        success: false,
        logs,
    }
}

/// Splits a directive line into its name and remainder.
fn split_directive(directive: &str) -> (&str, &str) {
    match directive.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest),
        None => (directive, ""),
    }
}

/// Flushes the current segment, trimming surrounding blank lines.
///
/// Returns the fatal error message when the segment carries the error
/// marker; good output gathered so far is discarded by the caller.
fn flush(current: &mut Vec<String>, segments: &mut Vec<String>) -> Result<(), String> {
    let lines = std::mem::take(current);
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let Some(start) = start else {
        return Ok(());
    };
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(start);
    let segment = lines[start..=end].join("\n");

    if let Some(at) = segment.find(ERROR_MARKER) {
        let tail = &segment[at + ERROR_MARKER.len()..];
        let message = tail.lines().next().unwrap_or("").trim().to_owned();
        return Err(message);
    }

    segments.push(segment);
    Ok(())
}

/// Interpolates `{{name}}` placeholders within one line.
///
/// Missing names append a diagnostic and render as the empty string; an
/// unterminated placeholder is a script error carried in `Err`.
fn interpolate(
    line: &str,
    bindings: &Bindings,
    number: usize,
    errors: &mut Vec<String>,
) -> Result<String, String> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        if ch == '{' && matches!(chars.peek(), Some((_, '{'))) {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == '}' && matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                return Err(format!(
                    "**unterminated placeholder** (line {number}, column {})",
                    position + 1
                ));
            }
            let name = name.trim();
            match bindings.get(name) {
                Some(value) => out.push_str(&value.render()),
                None => errors.push(format!("`env.{name}` not defined")),
            }
        } else {
            out.push(ch);
        }
    }

    Ok(out)
}

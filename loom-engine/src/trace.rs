//! Run trace assembly.
//!
//! A trace is the human-readable Markdown record of one run. Components push
//! typed sections in pipeline order; rendering happens exactly once at the
//! end, with the errors block always first regardless of when errors were
//! recorded. Nothing ever parses a trace back.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use loom_primitives::{RunId, Template, Value};

use crate::{Bindings, RequestParams, ResolvedSystem};

/// Rendered length beyond which a variable value counts as complex.
const COMPLEX_VALUE_LEN: usize = 80;

/// Append-only trace of one run.
#[derive(Clone, Debug)]
pub struct Trace {
    run_id: RunId,
    started_at: DateTime<Utc>,
    errors: Vec<String>,
    sections: Vec<(String, String)>,
}

impl Trace {
    /// Creates an empty trace for the given run.
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            errors: Vec::new(),
            sections: Vec::new(),
        }
    }

    /// Records an error line for the errors block.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Records several error lines at once.
    pub fn extend_errors<I, S>(&mut self, errors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors.extend(errors.into_iter().map(Into::into));
    }

    /// Returns whether any error has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Records the template identity and a numbered source listing.
    pub fn push_template(&mut self, template: &Template) {
        let mut body = format!("`{}` — {}\n\n", template.id(), template.title());
        for (index, line) in template.source().lines().enumerate() {
            let _ = writeln!(body, "{:>4} | {line}", index + 1);
        }
        self.push_section("Template", body.trim_end().to_owned());
    }

    /// Records the inline-prompt category matches.
    pub fn push_category_matches(&mut self, matches: &[(String, String)]) {
        let body = if matches.is_empty() {
            "(no matches)".to_owned()
        } else {
            matches
                .iter()
                .map(|(category, value)| format!("- `{category}`: {value}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.push_section("Category matches", body);
    }

    /// Records the console output captured during expansion.
    pub fn push_console(&mut self, logs: &str) {
        let body = if logs.is_empty() {
            "(no output)".to_owned()
        } else {
            fenced(logs.trim_end())
        };
        self.push_section("Console", body);
    }

    /// Records the expanded prompt body.
    pub fn push_prompt(&mut self, text: &str) {
        self.push_section("Prompt", fenced(text));
    }

    /// Records the variables section.
    ///
    /// Scalar values list inline; long, multiline, backtick-bearing, or
    /// structured values render as separate fenced blocks; a value identical
    /// to an earlier binding is cross-referenced by name instead.
    pub fn push_variables(&mut self, bindings: &Bindings) {
        let mut body = String::new();
        let mut rendered_before: Vec<(String, String)> = Vec::new();

        for (name, value) in bindings.iter() {
            let rendered = value.render();
            if let Some((earlier, _)) = rendered_before.iter().find(|(_, r)| *r == rendered) {
                let _ = writeln!(body, "- `{name}`: same as `{earlier}`");
            } else if is_complex(value, &rendered) {
                let _ = writeln!(body, "\n### `{name}`\n\n{}", fenced(&rendered));
            } else {
                let _ = writeln!(body, "- `{name}`: {rendered}");
            }
            rendered_before.push((name.to_owned(), rendered));
        }

        self.push_section("Variables", body.trim().to_owned());
    }

    /// Records the resolved system templates, one subsection each.
    pub fn push_system(&mut self, resolved: &ResolvedSystem) {
        let mut body = String::new();
        for section in &resolved.sections {
            let _ = writeln!(body, "### `{}`", section.id);
            let mut overrides = Vec::new();
            if let Some(model) = &section.model {
                overrides.push(format!("model {model}"));
            }
            if let Some(temperature) = section.temperature {
                overrides.push(format!("temperature {temperature}"));
            }
            if let Some(max_tokens) = section.max_tokens {
                overrides.push(format!("max tokens {max_tokens}"));
            }
            if !overrides.is_empty() {
                let _ = writeln!(body, "overrides: {}", overrides.join(", "));
            }
            let _ = writeln!(body, "\n{}\n", fenced(&section.expansion.text));
        }
        if body.is_empty() {
            body = "(no system templates)".to_owned();
        }
        self.push_section("System prompts", body.trim_end().to_owned());
    }

    /// Records the final resolved request parameters.
    pub fn push_params(&mut self, params: &RequestParams) {
        let body = format!(
            "- model: `{}`\n- temperature: {}\n- max tokens: {}",
            params.model, params.temperature, params.max_tokens
        );
        self.push_section("Request parameters", body);
    }

    /// Records the full final prompt sent to the model.
    pub fn push_final_prompt(&mut self, system_text: &str, user_text: &str) {
        let body = format!(
            "**system**\n\n{}\n\n**user**\n\n{}",
            fenced(system_text),
            fenced(user_text)
        );
        self.push_section("Final prompt", body);
    }

    /// Records a transport failure report.
    pub fn push_request_failure(&mut self, detail: &str) {
        self.push_section("Request failure", detail.to_owned());
    }

    /// Records the raw model output.
    pub fn push_ai_output(&mut self, output: &str) {
        self.push_section("Model output", fenced(output));
    }

    /// Records the rendered summary extracted from the model output.
    pub fn push_summary(&mut self, summary: &str) {
        self.push_section("Summary", summary.to_owned());
    }

    fn push_section(&mut self, heading: &str, body: String) {
        self.sections.push((heading.to_owned(), body));
    }

    /// Renders the trace into its final Markdown document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "# Trace\n\nRun `{}` started {}\n\n## Errors\n\n",
            self.run_id,
            self.started_at.to_rfc3339()
        );
        if self.errors.is_empty() {
            out.push_str("(none)\n");
        } else {
            for error in &self.errors {
                let _ = writeln!(out, "- {error}");
            }
        }
        for (heading, body) in &self.sections {
            let _ = write!(out, "\n## {heading}\n\n{body}\n");
        }
        out
    }
}

/// Returns whether a variable value should render as its own fenced block.
fn is_complex(value: &Value, rendered: &str) -> bool {
    !matches!(value, Value::Text(_))
        || rendered.contains('\n')
        || rendered.contains('`')
        || rendered.len() > COMPLEX_VALUE_LEN
}

/// Wraps text in a code fence long enough to contain any inner backticks.
fn fenced(text: &str) -> String {
    let longest_run = text
        .lines()
        .map(|line| line.chars().take_while(|c| *c == '`').count())
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest_run + 1).max(3));
    let mut body = text.to_owned();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    format!("{fence}\n{body}{fence}")
}

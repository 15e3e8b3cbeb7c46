//! Variable binding tables and environment construction.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use loom_primitives::{Fragment, FragmentId, Project, RunId, SourceFile, Template, Value};
use serde_json::json;
use tracing::debug;

use crate::{EngineError, EngineResult};

/// Name of the lazily-populated clipboard binding.
pub const CLIPBOARD_VAR: &str = "clipboard";

type ClipboardLoader = Arc<dyn Fn() -> String + Send + Sync>;

/// An insertion-ordered variable binding table.
///
/// Built fresh per run and immutable during expansion, except for the
/// clipboard entry which is loaded at most once on first lookup. Lookups of
/// missing names return `None`; the expander turns that into a diagnostic
/// plus an empty substitution rather than a failure.
#[derive(Default)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
    clipboard_loader: Option<ClipboardLoader>,
    clipboard: OnceLock<Value>,
}

impl Bindings {
    /// Creates an empty binding table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value under the given name, replacing any previous binding.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Installs the loader backing the lazy clipboard entry.
    pub fn set_clipboard_loader(&mut self, loader: ClipboardLoader) {
        self.clipboard_loader = Some(loader);
    }

    /// Looks up a binding by name.
    ///
    /// The clipboard entry is populated from its loader on first lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v) {
            return Some(value);
        }
        if name == CLIPBOARD_VAR {
            if let Some(loader) = &self.clipboard_loader {
                return Some(self.clipboard.get_or_init(|| Value::Text(loader())));
            }
        }
        None
    }

    /// Returns whether a name is bound (ignoring the lazy clipboard).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Iterates bound entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Returns the number of bound entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table has no bound entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("entries", &self.entries.len())
            .field("clipboard_loader", &self.clipboard_loader.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds the variable environment for one run.
///
/// Gathers the fragment's owning file, its transitively linked files, the
/// parent fragment's file, inline comment attributes, caller-supplied static
/// values, and the run/template metadata into a [`Bindings`] table.
pub struct EnvBuilder<'a> {
    project: &'a Project,
    fragment_id: FragmentId,
    template: &'a Template,
    ignore_output: bool,
    statics: Vec<(String, Value)>,
    clipboard_loader: Option<ClipboardLoader>,
    run_id: RunId,
    started_at: DateTime<Utc>,
}

impl<'a> EnvBuilder<'a> {
    /// Creates a builder for the given fragment and template.
    #[must_use]
    pub fn new(project: &'a Project, fragment_id: FragmentId, template: &'a Template) -> Self {
        Self {
            project,
            fragment_id,
            template,
            ignore_output: false,
            statics: Vec::new(),
            clipboard_loader: None,
            run_id: RunId::random(),
            started_at: Utc::now(),
        }
    }

    /// Skips the linked-files binding entirely when set.
    #[must_use]
    pub const fn ignore_output(mut self, ignore: bool) -> Self {
        self.ignore_output = ignore;
        self
    }

    /// Adds a static environment value.
    #[must_use]
    pub fn add_static(mut self, name: impl Into<String>, value: Value) -> Self {
        self.statics.push((name.into(), value));
        self
    }

    /// Installs the lazy clipboard loader.
    #[must_use]
    pub fn clipboard_loader(mut self, loader: ClipboardLoader) -> Self {
        self.clipboard_loader = Some(loader);
        self
    }

    /// Overrides the run identifier recorded in the `run` binding.
    #[must_use]
    pub const fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Builds the binding table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownFragment`] when the fragment id is not
    /// in the project arena, and [`EngineError::MissingFile`] when the
    /// fragment's owning file is not tracked.
    pub fn build(self) -> EngineResult<Bindings> {
        let fragment = self
            .project
            .fragment(self.fragment_id)
            .ok_or(EngineError::UnknownFragment {
                id: self.fragment_id,
            })?;
        let file = self
            .project
            .file(fragment.filename())
            .ok_or_else(|| EngineError::MissingFile {
                filename: fragment.filename().to_owned(),
            })?;

        let mut bindings = Bindings::new();
        bindings.bind("file", Value::File(file.clone()));

        if self.ignore_output {
            debug!(fragment = %self.fragment_id, "linked files skipped (ignore output)");
        } else {
            let links = collect_links(self.project, self.fragment_id);
            bindings.bind("links", Value::Files(links));
        }

        if let Some(parent_file) = fragment
            .parent()
            .and_then(|id| self.project.fragment(id))
            .and_then(|parent| self.project.file(parent.filename()))
        {
            bindings.bind("parent", Value::File(parent_file.clone()));
        }

        for (name, value) in fragment.attributes() {
            bindings.bind(name.clone(), Value::Text(value.clone()));
        }

        for (name, value) in self.statics {
            bindings.bind(name, value);
        }

        bindings.bind(
            "template",
            Value::Data(json!({
                "id": self.template.id(),
                "title": self.template.title(),
                "model": self.template.model(),
                "temperature": self.template.temperature(),
                "maxTokens": self.template.max_tokens(),
            })),
        );
        bindings.bind(
            "run",
            Value::Data(json!({
                "id": self.run_id.to_string(),
                "startedAt": self.started_at.to_rfc3339(),
            })),
        );

        if let Some(loader) = self.clipboard_loader {
            bindings.set_clipboard_loader(loader);
        }

        Ok(bindings)
    }
}

/// Collects the files referenced by a fragment and its descendants,
/// deduplicated by filename in discovery order.
fn collect_links(project: &Project, root: FragmentId) -> Vec<SourceFile> {
    let mut queue = vec![root];
    let mut seen = Vec::new();
    let mut out: Vec<SourceFile> = Vec::new();

    while let Some(id) = queue.pop() {
        let Some(fragment) = project.fragment(id) else {
            continue;
        };
        for reference in fragment.references() {
            match project.resolve_reference(fragment, reference) {
                Some(file) if !seen.contains(&file.filename().to_owned()) => {
                    seen.push(file.filename().to_owned());
                    out.push(file.clone());
                }
                Some(_) => {}
                None => {
                    debug!(%reference, fragment = %id, "unresolved fragment reference");
                }
            }
        }
        queue.extend(project.children(id));
    }

    out
}

/// Returns the template categories matched by the fragment's inline
/// attributes, paired with the attribute values, in template order.
#[must_use]
pub fn category_matches(template: &Template, fragment: &Fragment) -> Vec<(String, String)> {
    template
        .categories()
        .iter()
        .filter_map(|category| {
            fragment
                .attribute(category)
                .map(|value| (category.clone(), value.to_owned()))
        })
        .collect()
}

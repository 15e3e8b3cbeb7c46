//! Project, source file, and fragment model.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::paths::resolve_relative;
use crate::{Error, FragmentId, Result};
use crate::{Template, TemplateBuilder};

/// A parsed source document tracked by a [`Project`].
///
/// Filenames are absolute paths; content is the full document text.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    filename: String,
    content: String,
}

impl SourceFile {
    /// Creates a new source file descriptor.
    #[must_use]
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Returns the absolute filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the document text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the directory containing this file.
    #[must_use]
    pub fn directory(&self) -> &Path {
        Path::new(&self.filename)
            .parent()
            .unwrap_or_else(|| Path::new(""))
    }
}

/// A located region of a source document, linked into the fragment tree.
///
/// Fragments are produced by the external document parser and are read-only
/// here: the engine walks their references and attributes but never edits
/// them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    filename: String,
    range: Range<usize>,
    parent: Option<FragmentId>,
    references: Vec<String>,
    attributes: BTreeMap<String, String>,
}

impl Fragment {
    /// Starts building a fragment owned by the given file.
    #[must_use]
    pub fn builder(filename: impl Into<String>) -> FragmentBuilder {
        FragmentBuilder {
            filename: filename.into(),
            range: 0..0,
            parent: None,
            references: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the owning file's absolute filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the byte range this fragment occupies in its file.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Returns the parent fragment id, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<FragmentId> {
        self.parent
    }

    /// Returns the outbound file references declared on this fragment.
    #[must_use]
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Returns the inline comment attributes attached to this fragment.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns a single attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Builder for [`Fragment`].
#[derive(Debug)]
pub struct FragmentBuilder {
    filename: String,
    range: Range<usize>,
    parent: Option<FragmentId>,
    references: Vec<String>,
    attributes: BTreeMap<String, String>,
}

impl FragmentBuilder {
    /// Sets the byte range the fragment occupies.
    #[must_use]
    pub fn range(mut self, range: Range<usize>) -> Self {
        self.range = range;
        self
    }

    /// Sets the parent fragment id.
    #[must_use]
    pub const fn parent(mut self, parent: FragmentId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds an outbound file reference.
    #[must_use]
    pub fn add_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    /// Adds an inline comment attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Consumes the builder and returns the fragment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFragment`] when the owning filename is empty.
    pub fn build(self) -> Result<Fragment> {
        if self.filename.trim().is_empty() {
            return Err(Error::InvalidFragment {
                reason: "fragment filename cannot be empty".into(),
            });
        }
        Ok(Fragment {
            filename: self.filename,
            range: self.range,
            parent: self.parent,
            references: self.references,
            attributes: self.attributes,
        })
    }
}

/// In-memory project state: files, fragments, and templates.
///
/// The external parser populates a project once per session; the run
/// pipeline only reads from it.
#[derive(Clone, Debug, Default)]
pub struct Project {
    files: Vec<SourceFile>,
    fragments: Vec<Fragment>,
    templates: Vec<Template>,
}

impl Project {
    /// Creates an empty project.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source file.
    pub fn add_file(&mut self, file: SourceFile) {
        self.files.push(file);
    }

    /// Adds a template.
    pub fn add_template(&mut self, template: Template) {
        self.templates.push(template);
    }

    /// Convenience for registering a template built in place.
    ///
    /// # Errors
    ///
    /// Propagates the builder's validation error.
    pub fn add_template_with(&mut self, builder: TemplateBuilder) -> Result<()> {
        self.templates.push(builder.build()?);
        Ok(())
    }

    /// Adds a fragment to the arena and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFragment`] when the declared parent id does
    /// not exist in the arena.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Result<FragmentId> {
        if let Some(parent) = fragment.parent() {
            if parent.index() >= self.fragments.len() {
                return Err(Error::InvalidFragment {
                    reason: format!("parent fragment {parent} does not exist"),
                });
            }
        }
        self.fragments.push(fragment);
        Ok(FragmentId::from_index(self.fragments.len() - 1))
    }

    /// Looks up a file by absolute filename.
    #[must_use]
    pub fn file(&self, filename: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.filename() == filename)
    }

    /// Looks up a template by identifier.
    #[must_use]
    pub fn template(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id() == id)
    }

    /// Looks up a fragment by arena id.
    #[must_use]
    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.get(id.index())
    }

    /// Returns all tracked files.
    #[must_use]
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Returns all registered templates.
    #[must_use]
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Returns the ids of fragments whose parent is `id`.
    #[must_use]
    pub fn children(&self, id: FragmentId) -> Vec<FragmentId> {
        self.fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| f.parent() == Some(id))
            .map(|(index, _)| FragmentId::from_index(index))
            .collect()
    }

    /// Resolves a fragment reference to a tracked file.
    ///
    /// The reference is interpreted relative to the owning file's directory
    /// unless it is absolute.
    #[must_use]
    pub fn resolve_reference(&self, from: &Fragment, reference: &str) -> Option<&SourceFile> {
        let base = Path::new(from.filename())
            .parent()
            .unwrap_or_else(|| Path::new(""));
        let resolved = resolve_relative(base, reference);
        self.file(&resolved)
    }
}

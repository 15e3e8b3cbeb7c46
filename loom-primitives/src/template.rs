//! Prompt template model.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A reusable prompt script plus its request overrides and system-template
/// dependencies. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    id: String,
    title: String,
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_templates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    categories: Vec<String>,
}

impl Template {
    /// Starts building a template with the given identifier.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder {
            id: id.into(),
            title: None,
            source: String::new(),
            model: None,
            temperature: None,
            max_tokens: None,
            system_templates: None,
            categories: Vec::new(),
        }
    }

    /// Returns the template identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the script source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the model override, if declared.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the temperature override, if declared.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the max-token override, if declared.
    #[must_use]
    pub const fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Returns the declared system-template list.
    ///
    /// `None` means the template relies on the implicit canonical default.
    #[must_use]
    pub fn system_templates(&self) -> Option<&[String]> {
        self.system_templates.as_deref()
    }

    /// Returns the category names used for inline-prompt matching.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

/// Builder for [`Template`].
#[derive(Debug)]
pub struct TemplateBuilder {
    id: String,
    title: Option<String>,
    source: String,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    system_templates: Option<Vec<String>>,
    categories: Vec<String>,
}

impl TemplateBuilder {
    /// Sets the display title. Defaults to the identifier when unset.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the script source text.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Declares a model override.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Declares a temperature override.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Declares a max-token override.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Declares the ordered system-template identifier list.
    #[must_use]
    pub fn system_templates(mut self, ids: Vec<String>) -> Self {
        self.system_templates = Some(ids);
        self
    }

    /// Adds a category name used for inline-prompt matching.
    #[must_use]
    pub fn add_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Consumes the builder and returns the template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] when the identifier is empty.
    pub fn build(self) -> Result<Template> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidTemplate {
                reason: "template id cannot be empty".into(),
            });
        }
        let title = self.title.unwrap_or_else(|| self.id.clone());
        Ok(Template {
            id: self.id,
            title,
            source: self.source,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system_templates: self.system_templates,
            categories: self.categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_template_with_overrides() {
        let template = Template::builder("refactor")
            .title("Refactor helper")
            .source("Rewrite {{file}}")
            .model("claude-3-5-sonnet-20241022")
            .temperature(0.1)
            .max_tokens(2048)
            .system_templates(vec!["system".into(), "style".into()])
            .add_category("refactoring")
            .build()
            .unwrap();

        assert_eq!(template.id(), "refactor");
        assert_eq!(template.title(), "Refactor helper");
        assert_eq!(template.model(), Some("claude-3-5-sonnet-20241022"));
        assert_eq!(template.temperature(), Some(0.1));
        assert_eq!(template.max_tokens(), Some(2048));
        assert_eq!(
            template.system_templates(),
            Some(&["system".to_owned(), "style".to_owned()][..])
        );
        assert_eq!(template.categories(), ["refactoring"]);
    }

    #[test]
    fn title_defaults_to_id() {
        let template = Template::builder("summarize").build().unwrap();
        assert_eq!(template.title(), "summarize");
        assert!(template.system_templates().is_none());
    }

    #[test]
    fn id_is_required() {
        assert!(Template::builder("").build().is_err());
    }
}

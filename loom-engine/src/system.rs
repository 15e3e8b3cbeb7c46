//! System-template resolution and request parameter precedence.

use loom_primitives::{Project, Template};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Bindings, EngineError, EngineResult, Expansion, expand};

/// Identifier of the canonical system template.
pub const CANONICAL_SYSTEM: &str = "system";

/// Sentinel entry that excludes the canonical system template.
///
/// A template declaring exactly `["none"]` runs with no system prompt.
pub const NO_SYSTEM: &str = "none";

/// Baseline model identifier used when neither the template nor its system
/// templates declare one.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default sampling temperature, kept low to favor determinism.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default completion token ceiling.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request parameters resolved from a template and its system templates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    /// Resolved model identifier.
    pub model: String,
    /// Resolved sampling temperature.
    pub temperature: f32,
    /// Resolved completion token ceiling.
    pub max_tokens: u32,
}

/// One resolved system template and its expansion.
#[derive(Clone, Debug)]
pub struct SystemSection {
    /// The system template's identifier.
    pub id: String,
    /// Its declared model override, if any.
    pub model: Option<String>,
    /// Its declared temperature override, if any.
    pub temperature: Option<f32>,
    /// Its declared max-token override, if any.
    pub max_tokens: Option<u32>,
    /// The expansion of its script body.
    pub expansion: Expansion,
}

/// Combined system prompt text, its sections, and the resolved parameters.
#[derive(Clone, Debug)]
pub struct ResolvedSystem {
    /// System-prompt text: each section's expansion joined by a line break.
    pub text: String,
    /// One entry per resolved system template, in resolution order.
    pub sections: Vec<SystemSection>,
    /// Resolved request parameters.
    pub params: RequestParams,
    /// Trace-visible notes for declared templates that were not found.
    pub errors: Vec<String>,
}

impl ResolvedSystem {
    /// Returns whether every resolved section expanded successfully.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.sections.iter().all(|s| s.expansion.success)
    }
}

/// Resolves a template's system templates and request parameters.
///
/// The declared list defaults to the canonical `system` entry when absent;
/// any declared list that omits the canonical entry gets it prepended,
/// unless the list is exactly `["none"]`. Missing declared templates are
/// recorded and skipped. Precedence for model, temperature, and max tokens:
/// the main template's override, else the first declared value scanning the
/// resolved system templates in order, else the fixed defaults.
///
/// # Errors
///
/// Returns [`EngineError::CanonicalSystemMissing`] when the implicit
/// canonical default resolved nothing at all.
pub fn resolve_system(
    project: &Project,
    template: &Template,
    bindings: &Bindings,
) -> EngineResult<ResolvedSystem> {
    let (names, implicit) = declared_names(template);

    let mut sections = Vec::new();
    let mut errors = Vec::new();
    for name in &names {
        match project.template(name) {
            Some(system) => {
                let expansion = expand(system.source(), bindings);
                sections.push(SystemSection {
                    id: system.id().to_owned(),
                    model: system.model().map(ToOwned::to_owned),
                    temperature: system.temperature(),
                    max_tokens: system.max_tokens(),
                    expansion,
                });
            }
            None => {
                warn!(%name, "system template not found");
                errors.push(format!("system template `{name}` not found"));
            }
        }
    }

    if implicit && sections.is_empty() {
        return Err(EngineError::CanonicalSystemMissing);
    }

    let text = sections
        .iter()
        .map(|s| s.expansion.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let model = template
        .model()
        .map(ToOwned::to_owned)
        .or_else(|| sections.iter().find_map(|s| s.model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_owned());
    let temperature = template
        .temperature()
        .or_else(|| sections.iter().find_map(|s| s.temperature))
        .unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = template
        .max_tokens()
        .or_else(|| sections.iter().find_map(|s| s.max_tokens))
        .unwrap_or(DEFAULT_MAX_TOKENS);

    Ok(ResolvedSystem {
        text,
        sections,
        params: RequestParams {
            model,
            temperature,
            max_tokens,
        },
        errors,
    })
}

/// Returns the effective system-template name list and whether it came from
/// the implicit canonical default.
fn declared_names(template: &Template) -> (Vec<String>, bool) {
    match template.system_templates() {
        None => (vec![CANONICAL_SYSTEM.to_owned()], true),
        Some([only]) if only == NO_SYSTEM => (Vec::new(), false),
        Some(list) => {
            let mut names: Vec<String> = list.to_vec();
            if !names.iter().any(|n| n == CANONICAL_SYSTEM) {
                names.insert(0, CANONICAL_SYSTEM.to_owned());
            }
            (names, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_system(source: &str) -> Project {
        let mut project = Project::new();
        project.add_template(
            Template::builder(CANONICAL_SYSTEM)
                .source(source)
                .build()
                .unwrap(),
        );
        project
    }

    #[test]
    fn implicit_default_resolves_canonical_template() {
        let project = project_with_system("You are a careful editor.");
        let template = Template::builder("main").build().unwrap();

        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert_eq!(resolved.sections.len(), 1);
        assert_eq!(resolved.text, "You are a careful editor.");
        assert!(resolved.errors.is_empty());
    }

    #[test]
    fn missing_canonical_default_is_fatal() {
        let project = Project::new();
        let template = Template::builder("main").build().unwrap();

        let err = resolve_system(&project, &template, &Bindings::new()).unwrap_err();
        assert!(matches!(err, EngineError::CanonicalSystemMissing));
    }

    #[test]
    fn declared_list_gets_canonical_prepended() {
        let mut project = project_with_system("base");
        project.add_template(Template::builder("style").source("terse").build().unwrap());
        let template = Template::builder("main")
            .system_templates(vec!["style".into()])
            .build()
            .unwrap();

        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        let ids: Vec<_> = resolved.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["system", "style"]);
        assert_eq!(resolved.text, "base\nterse");
    }

    #[test]
    fn none_sentinel_excludes_canonical() {
        let project = project_with_system("base");
        let template = Template::builder("main")
            .system_templates(vec![NO_SYSTEM.into()])
            .build()
            .unwrap();

        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert!(resolved.sections.is_empty());
        assert!(resolved.text.is_empty());
    }

    #[test]
    fn missing_declared_template_is_recorded_not_fatal() {
        let project = project_with_system("base");
        let template = Template::builder("main")
            .system_templates(vec!["ghost".into()])
            .build()
            .unwrap();

        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert_eq!(resolved.sections.len(), 1);
        assert_eq!(resolved.errors, vec!["system template `ghost` not found"]);
    }

    #[test]
    fn model_precedence_prefers_main_then_system_then_default() {
        let mut project = project_with_system("base");
        project.add_template(
            Template::builder("tuned")
                .source("tuned prompt")
                .model("model-x")
                .build()
                .unwrap(),
        );

        // System template supplies the model when the main template is silent.
        let template = Template::builder("main")
            .system_templates(vec!["tuned".into()])
            .build()
            .unwrap();
        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert_eq!(resolved.params.model, "model-x");

        // Main template override wins.
        let template = Template::builder("main")
            .model("model-y")
            .system_templates(vec!["tuned".into()])
            .build()
            .unwrap();
        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert_eq!(resolved.params.model, "model-y");

        // Nothing declared anywhere falls back to the baseline.
        let template = Template::builder("main").build().unwrap();
        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert_eq!(resolved.params.model, DEFAULT_MODEL);
        assert!((resolved.params.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(resolved.params.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn failed_system_expansion_is_reported() {
        let project = project_with_system("@broken");
        let template = Template::builder("main").build().unwrap();

        let resolved = resolve_system(&project, &template, &Bindings::new()).unwrap();
        assert!(!resolved.all_succeeded());
    }
}

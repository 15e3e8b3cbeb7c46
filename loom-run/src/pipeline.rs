//! Run pipeline execution.

use std::path::Path;
use std::sync::Arc;

use loom_engine::{EngineError, EnvBuilder, Trace, category_matches, expand, resolve_system};
use loom_extract::{Edit, EditError, FileEdits, FileStore, extract_response, synthesize_edits};
use loom_primitives::{FragmentId, Project, RunId};
use loom_transport::{ChatTransport, CompletionRequest, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::RunOptions;

/// Errors the runner can return.
///
/// Script-level failures are not errors: they produce a failed
/// [`RunOutcome`] whose text is the trace. These variants cover broken
/// preconditions and transport failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The requested template id is not registered in the project.
    #[error("unknown template `{id}`")]
    UnknownTemplate {
        /// The offending template id.
        id: String,
    },

    /// A broken engine precondition (unknown fragment, untracked file, or
    /// missing canonical system template).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The completion transport failed; the partial-trace callback has
    /// already fired by the time this is returned.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Edit synthesis could not read an existing target file.
    #[error(transparent)]
    Edits(#[from] EditError),
}

/// Final result of one run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Ordered edit operations for the caller to apply.
    pub edits: Vec<Edit>,
    /// Before/after records keyed by absolute filename.
    pub file_edits: FileEdits,
    /// The rendered Markdown trace.
    pub trace: String,
    /// The final output text. For a failed run this is the trace itself.
    pub text: String,
    /// The extracted summary, when the reply carried one.
    pub summary: Option<String>,
    /// Whether expansion succeeded and a completion was processed.
    pub succeeded: bool,
}

/// Executes template runs against a project.
pub struct Runner {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn FileStore>,
}

impl Runner {
    /// Creates a runner with the given transport and file store.
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, store: Arc<dyn FileStore>) -> Self {
        Self { transport, store }
    }

    /// Runs a template against a fragment.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::UnknownTemplate`] or [`RunError::Engine`] for
    /// broken preconditions, [`RunError::Transport`] when the completion
    /// call fails (after updating the trace and firing the partial-trace
    /// callback), and [`RunError::Edits`] when an existing target file
    /// cannot be read during edit synthesis.
    pub async fn run(
        &self,
        project: &Project,
        fragment_id: FragmentId,
        template_id: &str,
        options: RunOptions,
    ) -> Result<RunOutcome, RunError> {
        let template = project
            .template(template_id)
            .ok_or_else(|| RunError::UnknownTemplate {
                id: template_id.to_owned(),
            })?;
        let fragment = project
            .fragment(fragment_id)
            .ok_or(EngineError::UnknownFragment { id: fragment_id })
            .map_err(RunError::from)?;

        let run_id = RunId::random();
        info!(%run_id, template = template_id, fragment = %fragment_id, "starting run");
        let mut trace = Trace::new(run_id);

        let mut env = EnvBuilder::new(project, fragment_id, template)
            .ignore_output(options.ignore_output)
            .run_id(run_id);
        for (name, value) in options.statics {
            env = env.add_static(name, value);
        }
        if let Some(loader) = options.clipboard_loader {
            env = env.clipboard_loader(loader);
        }
        let bindings = env.build()?;

        let expansion = expand(template.source(), &bindings);

        trace.push_template(template);
        trace.push_category_matches(&category_matches(template, fragment));
        trace.push_console(&expansion.logs);
        trace.push_prompt(&expansion.text);
        trace.push_variables(&bindings);
        trace.extend_errors(expansion.errors.iter().cloned());

        if !expansion.success {
            warn!(template = template_id, "template expansion failed");
            return Ok(failed_outcome(&trace));
        }

        let resolved = resolve_system(project, template, &bindings)?;
        trace.extend_errors(resolved.errors.iter().cloned());
        for section in &resolved.sections {
            trace.extend_errors(section.expansion.errors.iter().cloned());
        }
        trace.push_system(&resolved);

        if !resolved.all_succeeded() {
            warn!(template = template_id, "system template expansion failed");
            return Ok(failed_outcome(&trace));
        }

        trace.push_params(&resolved.params);
        trace.push_final_prompt(&resolved.text, &expansion.text);

        let request = CompletionRequest::new(
            resolved.params.model.clone(),
            resolved.params.temperature,
            resolved.params.max_tokens,
            resolved.text.clone(),
            expansion.text.clone(),
        );

        let output = match self.transport.complete(request, options.cancel.clone()).await {
            Ok(output) => output,
            Err(error) => {
                warn!(%error, "completion request failed");
                trace.push_request_failure(&describe_failure(&error));
                trace.push_error(error.to_string());
                if let Some(callback) = &options.on_partial_trace {
                    callback(&trace.render());
                }
                return Err(error.into());
            }
        };

        trace.push_ai_output(&output);

        let base_dir = Path::new(fragment.filename())
            .parent()
            .unwrap_or_else(|| Path::new(""));
        let extraction = extract_response(&output, base_dir);
        debug!(
            files = extraction.files.len(),
            leftovers = extraction.leftovers.len(),
            "response extracted"
        );

        let (edits, file_edits) =
            synthesize_edits(&extraction.files, fragment, self.store.as_ref()).await?;

        if let Some(summary) = &extraction.summary {
            trace.push_summary(summary);
        }

        info!(%run_id, edits = edits.len(), "run complete");
        Ok(RunOutcome {
            edits,
            file_edits,
            trace: trace.render(),
            text: extraction.text,
            summary: extraction.summary,
            succeeded: true,
        })
    }
}

/// Builds the template-failed outcome: no edits, text set to the trace.
fn failed_outcome(trace: &Trace) -> RunOutcome {
    let rendered = trace.render();
    RunOutcome {
        edits: Vec::new(),
        file_edits: FileEdits::new(),
        text: rendered.clone(),
        trace: rendered,
        summary: None,
        succeeded: false,
    }
}

/// Renders a transport failure for the trace.
fn describe_failure(error: &TransportError) -> String {
    match error {
        TransportError::Request {
            status,
            status_text,
            body,
        } => {
            let mut out = format!("- status: {status} {status_text}");
            if let Some(body) = body {
                if let Some(message) = &body.message {
                    out.push_str(&format!("\n- message: {message}"));
                }
                if let Some(kind) = &body.kind {
                    out.push_str(&format!("\n- type: {kind}"));
                }
                if let Some(code) = &body.code {
                    out.push_str(&format!("\n- code: {code}"));
                }
            }
            out
        }
        TransportError::Cancelled => "- cancelled by caller".to_owned(),
        TransportError::Configuration { reason } | TransportError::Other { reason } => {
            format!("- {reason}")
        }
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loom_engine::{DEFAULT_MODEL, ERROR_MARKER};
use loom_extract::{Edit, FileStore, MemoryFileStore};
use loom_primitives::{Fragment, FragmentId, Project, SourceFile, Template};
use loom_run::{RunError, RunOptions, Runner};
use loom_transport::{ChatTransport, CompletionRequest, TransportError, TransportResult};
use tokio_util::sync::CancellationToken;

/// Scripted transport that returns a fixed reply and records requests.
struct ScriptedTransport {
    reply: String,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedTransport {
    fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> TransportResult<String> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        Ok(self.reply.clone())
    }
}

/// Transport that always fails with a structured request error.
struct FailingTransport;

#[async_trait]
impl ChatTransport for FailingTransport {
    async fn complete(
        &self,
        _request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> TransportResult<String> {
        Err(TransportError::Request {
            status: 502,
            status_text: "Bad Gateway".into(),
            body: None,
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A project with one document fragment, the canonical system template, and
/// a main template reading the current file.
fn fixture_project() -> (Project, FragmentId) {
    let mut project = Project::new();
    project.add_file(SourceFile::new("/work/doc.md", "# Plan\n\nWrite the file."));
    project.add_template(
        Template::builder("system")
            .source("You are a careful collaborator.")
            .build()
            .unwrap(),
    );
    project.add_template(
        Template::builder("main")
            .title("Main template")
            .source("Apply this change:\n\n{{file}}")
            .build()
            .unwrap(),
    );

    let fragment_id = project
        .add_fragment(
            Fragment::builder("/work/doc.md")
                .range(0..23)
                .build()
                .unwrap(),
        )
        .unwrap();
    (project, fragment_id)
}

fn runner(transport: Arc<dyn ChatTransport>, store: Arc<dyn FileStore>) -> Runner {
    Runner::new(transport, store)
}

#[tokio::test]
async fn full_run_creates_files_and_extracts_summary() {
    init_tracing();
    let (project, fragment_id) = fixture_project();
    let reply = "File ./new.txt\n```\nfresh content\n```\n\nSUMMARY\n```\nCreated new.txt.\n```\nAll done.";
    let transport = Arc::new(ScriptedTransport::new(reply));
    let store = Arc::new(MemoryFileStore::new());

    let outcome = runner(Arc::clone(&transport) as _, Arc::clone(&store) as _)
        .run(&project, fragment_id, "main", RunOptions::new())
        .await
        .unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.summary.as_deref(), Some("Created new.txt."));
    assert_eq!(outcome.text, "All done.");

    let create = outcome
        .edits
        .iter()
        .find(|edit| matches!(edit, Edit::Create { .. }))
        .expect("create edit");
    assert!(matches!(
        create,
        Edit::Create { filename, text, .. }
            if filename == "/work/new.txt" && text == "fresh content"
    ));
    // The new file is unreferenced, so a link insert lands at the end of the
    // fragment's range.
    assert!(outcome.edits.iter().any(|edit| matches!(
        edit,
        Edit::Insert { filename, offset, .. }
            if filename == "/work/doc.md" && *offset == 23
    )));

    let record = &outcome.file_edits["/work/new.txt"];
    assert!(record.before.is_none());
    assert_eq!(record.after, "fresh content");

    // The expanded prompt carried the file binding to the model.
    let request = transport.last_request().unwrap();
    assert!(request.user().contains("Write the file."));
    assert_eq!(request.system(), "You are a careful collaborator.");

    for heading in ["## Errors", "## Template", "## Prompt", "## Model output", "## Summary"] {
        assert!(outcome.trace.contains(heading), "missing {heading}");
    }
}

#[tokio::test]
async fn failed_expansion_short_circuits_before_the_completion_call() {
    let (mut project, fragment_id) = fixture_project();
    project.add_template(
        Template::builder("exploding")
            .source(format!("{ERROR_MARKER} boom"))
            .build()
            .unwrap(),
    );
    let transport = Arc::new(ScriptedTransport::new("unused"));
    let store = Arc::new(MemoryFileStore::new());

    let outcome = runner(Arc::clone(&transport) as _, store)
        .run(&project, fragment_id, "exploding", RunOptions::new())
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(transport.calls(), 0, "no completion request may be issued");
    assert!(outcome.edits.is_empty());
    assert_eq!(outcome.text, outcome.trace, "failed runs return the trace as text");
    assert!(outcome.trace.contains("boom"));
}

#[tokio::test]
async fn undefined_variables_degrade_into_trace_diagnostics() {
    let (mut project, fragment_id) = fixture_project();
    project.add_template(
        Template::builder("typo")
            .source("Uses {{misspelled}} here.")
            .build()
            .unwrap(),
    );
    let transport = Arc::new(ScriptedTransport::new("ok"));
    let store = Arc::new(MemoryFileStore::new());

    let outcome = runner(transport, store)
        .run(&project, fragment_id, "typo", RunOptions::new())
        .await
        .unwrap();

    assert!(outcome.succeeded, "binding errors never abort a run");
    assert!(outcome.trace.contains("`env.misspelled` not defined"));
}

#[tokio::test]
async fn transport_failure_fires_partial_trace_and_re_raises() {
    let (project, fragment_id) = fixture_project();
    let partial: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&partial);
    let options = RunOptions::new().on_partial_trace(Arc::new(move |trace: &str| {
        *sink.lock().unwrap() = Some(trace.to_owned());
    }));

    let err = runner(Arc::new(FailingTransport), Arc::new(MemoryFileStore::new()))
        .run(&project, fragment_id, "main", options)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Transport(TransportError::Request { status: 502, .. })
    ));
    let captured = partial.lock().unwrap().clone().expect("partial trace fired");
    assert!(captured.contains("502 Bad Gateway"));
    assert!(captured.contains("## Request failure"));
}

#[tokio::test]
async fn cancellation_surfaces_as_a_transport_error() {
    let (project, fragment_id) = fixture_project();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = RunOptions::new().cancel(cancel);

    let err = runner(
        Arc::new(ScriptedTransport::new("unused")),
        Arc::new(MemoryFileStore::new()),
    )
    .run(&project, fragment_id, "main", options)
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        RunError::Transport(TransportError::Cancelled)
    ));
}

#[tokio::test]
async fn single_leftover_block_becomes_the_output_text() {
    let (project, fragment_id) = fixture_project();
    let transport = Arc::new(ScriptedTransport::new("Foo\n```\nbar\n```\n"));

    let outcome = runner(transport, Arc::new(MemoryFileStore::new()))
        .run(&project, fragment_id, "main", RunOptions::new())
        .await
        .unwrap();

    assert_eq!(outcome.text, "bar");
}

#[tokio::test]
async fn whole_reply_fence_is_unwrapped() {
    let (project, fragment_id) = fixture_project();
    let transport = Arc::new(ScriptedTransport::new("```js\nconsole.log(1)\n```"));

    let outcome = runner(transport, Arc::new(MemoryFileStore::new()))
        .run(&project, fragment_id, "main", RunOptions::new())
        .await
        .unwrap();

    assert_eq!(outcome.text, "console.log(1)");
}

#[tokio::test]
async fn rerunning_identical_content_produces_no_edits() {
    let (project, fragment_id) = fixture_project();
    let reply = "File ./new.txt\n```\nfresh content\n```\n";
    let store = Arc::new(MemoryFileStore::new());
    store.insert("/work/new.txt", "fresh content");

    let outcome = runner(Arc::new(ScriptedTransport::new(reply)), store)
        .run(&project, fragment_id, "main", RunOptions::new())
        .await
        .unwrap();

    assert!(outcome.edits.is_empty());
    assert!(outcome.file_edits.is_empty());
}

#[tokio::test]
async fn system_template_model_wins_over_the_default() {
    let (mut project, fragment_id) = fixture_project();
    project.add_template(
        Template::builder("tuned")
            .source("Stay terse.")
            .model("model-x")
            .build()
            .unwrap(),
    );
    project.add_template(
        Template::builder("tuned-main")
            .source("Do it.")
            .system_templates(vec!["tuned".into()])
            .build()
            .unwrap(),
    );
    let transport = Arc::new(ScriptedTransport::new("done"));

    runner(Arc::clone(&transport) as _, Arc::new(MemoryFileStore::new()))
        .run(&project, fragment_id, "tuned-main", RunOptions::new())
        .await
        .unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.model(), "model-x");
}

#[tokio::test]
async fn default_model_applies_when_nothing_declares_one() {
    let (project, fragment_id) = fixture_project();
    let transport = Arc::new(ScriptedTransport::new("done"));

    runner(Arc::clone(&transport) as _, Arc::new(MemoryFileStore::new()))
        .run(&project, fragment_id, "main", RunOptions::new())
        .await
        .unwrap();

    assert_eq!(transport.last_request().unwrap().model(), DEFAULT_MODEL);
}

#[tokio::test]
async fn missing_canonical_system_template_is_fatal() {
    let mut project = Project::new();
    project.add_file(SourceFile::new("/work/doc.md", "body"));
    project.add_template(Template::builder("main").source("hi").build().unwrap());
    let fragment_id = project
        .add_fragment(Fragment::builder("/work/doc.md").build().unwrap())
        .unwrap();

    let err = runner(
        Arc::new(ScriptedTransport::new("unused")),
        Arc::new(MemoryFileStore::new()),
    )
    .run(&project, fragment_id, "main", RunOptions::new())
    .await
    .unwrap_err();

    assert!(matches!(err, RunError::Engine(_)));
}

#[tokio::test]
async fn unknown_template_id_is_rejected() {
    let (project, fragment_id) = fixture_project();

    let err = runner(
        Arc::new(ScriptedTransport::new("unused")),
        Arc::new(MemoryFileStore::new()),
    )
    .run(&project, fragment_id, "ghost", RunOptions::new())
    .await
    .unwrap_err();

    assert!(matches!(err, RunError::UnknownTemplate { .. }));
}

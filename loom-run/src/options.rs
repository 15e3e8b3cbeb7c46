//! Per-run options.

use std::fmt;
use std::sync::Arc;

use loom_primitives::Value;
use tokio_util::sync::CancellationToken;

/// Options for a single template run.
#[derive(Default)]
pub struct RunOptions {
    /// Skips the linked-files binding entirely when set.
    pub ignore_output: bool,
    /// Static environment values bound into the variable table.
    pub statics: Vec<(String, Value)>,
    /// Loader backing the lazily-populated clipboard binding.
    pub clipboard_loader: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    /// Cooperative cancellation signal, threaded through the completion
    /// request only; expansion does not poll it.
    pub cancel: CancellationToken,
    /// Callback receiving the trace so far when a transport failure aborts
    /// the run.
    pub on_partial_trace: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl RunOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ignore-output flag.
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

    /// Installs the clipboard loader.
    #[must_use]
    pub fn clipboard_loader(mut self, loader: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        self.clipboard_loader = Some(loader);
        self
    }

    /// Installs the cancellation token.
    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Installs the partial-trace callback.
    #[must_use]
    pub fn on_partial_trace(mut self, callback: Arc<dyn Fn(&str) + Send + Sync>) -> Self {
        self.on_partial_trace = Some(callback);
        self
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("ignore_output", &self.ignore_output)
            .field("statics", &self.statics.len())
            .field("clipboard_loader", &self.clipboard_loader.is_some())
            .field("on_partial_trace", &self.on_partial_trace.is_some())
            .finish_non_exhaustive()
    }
}

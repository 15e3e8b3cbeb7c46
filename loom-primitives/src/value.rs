//! Variable binding values and their prompt rendering.

use serde::{Deserialize, Serialize};

use crate::SourceFile;

/// A single variable binding value.
///
/// Files render as `File <name>` labelled fenced blocks, the same named-block
/// convention the response extractor parses back out of model output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Plain text, rendered verbatim.
    Text(String),
    /// A single file: name plus content.
    File(SourceFile),
    /// An ordered list of files.
    Files(Vec<SourceFile>),
    /// Arbitrary structured data, rendered as pretty-printed JSON.
    Data(serde_json::Value),
}

impl Value {
    /// Renders the value as prompt text.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::File(file) => render_file(file),
            Self::Files(files) => files
                .iter()
                .map(render_file)
                .collect::<Vec<_>>()
                .join("\n\n"),
            Self::Data(data) => {
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            }
        }
    }

    /// Returns the text payload when the value is plain text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

fn render_file(file: &SourceFile) -> String {
    let mut body = file.content().to_owned();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    format!("File {}\n```\n{body}```", file.filename())
}

use serde::{Deserialize, Serialize};

use crate::{
    domain::LineKind,
    protocol::{BatchItem, UploadOutcome},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLine {
    pub kind: LineKind,
    pub text: String,
}

impl ResultLine {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Error,
            text: text.into(),
        }
    }
}

/// Lines shown in the result area for one reply.
///
/// Per-item batch failures are prefixed with `Error: `; a whole-request
/// failure shows the server message as-is.
pub fn render(outcome: &UploadOutcome) -> Vec<ResultLine> {
    match outcome {
        UploadOutcome::Single { filename, .. } => {
            vec![ResultLine::success(format!("Uploaded: {filename}"))]
        }
        UploadOutcome::Batch { results, .. } => results.iter().map(render_item).collect(),
        UploadOutcome::Failed { message, .. } => vec![ResultLine::error(message.clone())],
    }
}

fn render_item(item: &BatchItem) -> ResultLine {
    match item {
        BatchItem::Saved { new_filename, .. } => {
            ResultLine::success(format!("Uploaded: {new_filename}"))
        }
        BatchItem::Rejected { filename, .. } => ResultLine::error(format!("Error: {filename}")),
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;

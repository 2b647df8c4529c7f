use serde::{Deserialize, Serialize};

use crate::{domain::UploadStatus, error::ProtocolError};

/// Upload reply exactly as it travels over HTTP.
///
/// The shape is decided by which optional fields are present, so nothing
/// outside this module should branch on them; convert to [`UploadOutcome`]
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BatchItemResponse>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_filename: Option<String>,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Reply of the publish trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub status: UploadStatus,
    pub message: String,
}

/// Decoded upload reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Single {
        filename: String,
        message: Option<String>,
    },
    Batch {
        results: Vec<BatchItem>,
        message: Option<String>,
    },
    /// Whole-request failure. `results` is only populated when a batch was
    /// processed and every item failed.
    Failed {
        message: String,
        results: Vec<BatchItem>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItem {
    Saved {
        filename: Option<String>,
        new_filename: String,
        message: Option<String>,
    },
    Rejected {
        filename: String,
        message: Option<String>,
    },
}

impl UploadOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            results: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl BatchItem {
    pub fn saved(
        filename: impl Into<String>,
        new_filename: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self::Saved {
            filename: Some(filename.into()),
            new_filename: new_filename.into(),
            message,
        }
    }

    pub fn rejected(filename: impl Into<String>, message: Option<String>) -> Self {
        Self::Rejected {
            filename: filename.into(),
            message,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

impl TryFrom<UploadResponse> for UploadOutcome {
    type Error = ProtocolError;

    fn try_from(value: UploadResponse) -> Result<Self, Self::Error> {
        if value.status.is_success() {
            if let Some(filename) = value.filename {
                return Ok(Self::Single {
                    filename,
                    message: value.message,
                });
            }
            if let Some(results) = value.results {
                return Ok(Self::Batch {
                    results: decode_items(results)?,
                    message: value.message,
                });
            }
            return Err(ProtocolError::MissingPayload);
        }

        let message = value.message.ok_or(ProtocolError::MissingMessage)?;
        Ok(Self::Failed {
            message,
            results: decode_items(value.results.unwrap_or_default())?,
        })
    }
}

fn decode_items(items: Vec<BatchItemResponse>) -> Result<Vec<BatchItem>, ProtocolError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| decode_item(index, item))
        .collect()
}

fn decode_item(index: usize, item: BatchItemResponse) -> Result<BatchItem, ProtocolError> {
    if item.status.is_success() {
        let new_filename = item
            .new_filename
            .ok_or(ProtocolError::MissingNewFilename { index })?;
        Ok(BatchItem::Saved {
            filename: item.filename,
            new_filename,
            message: item.message,
        })
    } else {
        let filename = item
            .filename
            .ok_or(ProtocolError::MissingFilename { index })?;
        Ok(BatchItem::Rejected {
            filename,
            message: item.message,
        })
    }
}

impl From<UploadOutcome> for UploadResponse {
    fn from(value: UploadOutcome) -> Self {
        match value {
            UploadOutcome::Single { filename, message } => Self {
                status: UploadStatus::Success,
                message,
                filename: Some(filename),
                results: None,
            },
            UploadOutcome::Batch { results, message } => Self {
                status: UploadStatus::Success,
                message,
                filename: None,
                results: Some(results.into_iter().map(Into::into).collect()),
            },
            UploadOutcome::Failed { message, results } => Self {
                status: UploadStatus::Error,
                message: Some(message),
                filename: None,
                results: (!results.is_empty())
                    .then(|| results.into_iter().map(Into::into).collect()),
            },
        }
    }
}

impl From<BatchItem> for BatchItemResponse {
    fn from(value: BatchItem) -> Self {
        match value {
            BatchItem::Saved {
                filename,
                new_filename,
                message,
            } => Self {
                filename,
                new_filename: Some(new_filename),
                status: UploadStatus::Success,
                message,
            },
            BatchItem::Rejected { filename, message } => Self {
                filename: Some(filename),
                new_filename: None,
                status: UploadStatus::Error,
                message,
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;

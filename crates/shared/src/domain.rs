use serde::{Deserialize, Serialize};

/// Top-level and per-item `status` values on the upload wire.
///
/// Anything other than `success` is treated as a failure when rendering; the
/// server itself only emits `success` and `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Success,
    Error,
    PartialSuccess,
    #[serde(other)]
    Unknown,
}

impl UploadStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Success,
    Error,
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Upstream,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A reply body that parsed as JSON but does not match any upload shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("success reply carries neither `filename` nor `results`")]
    MissingPayload,
    #[error("failure reply carries no `message`")]
    MissingMessage,
    #[error("batch item {index} reported success without `new_filename`")]
    MissingNewFilename { index: usize },
    #[error("batch item {index} reported failure without `filename`")]
    MissingFilename { index: usize },
}

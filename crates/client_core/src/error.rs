use std::{io, path::PathBuf};

use shared::error::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status} with an unreadable body: {source}")]
    Decode {
        status: u16,
        source: serde_json::Error,
    },
    #[error("unexpected reply shape: {0}")]
    Protocol(#[from] ProtocolError),
}

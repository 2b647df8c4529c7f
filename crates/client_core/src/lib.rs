use std::path::Path;

use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::protocol::{PushResponse, UploadOutcome, UploadResponse};
use tracing::debug;
use url::Url;

mod board;
pub mod error;

pub use board::{ResultBoard, Submission};
pub use error::ClientError;

const PAGE_PATH: &str = "/";
const TRIGGER_PUSH_PATH: &str = "/api/trigger-push";

/// A file staged for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = guess_mime(Path::new(&filename));
        Self {
            filename,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            filename,
            mime_type: guess_mime(path),
            bytes,
        })
    }

    fn into_part(self) -> Result<Part, ClientError> {
        let part = Part::bytes(self.bytes).file_name(self.filename);
        match self.mime_type {
            Some(mime) => Ok(part.mime_str(&mime)?),
            None => Ok(part),
        }
    }
}

fn guess_mime(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Submits uploads the same way the upload page does.
pub struct UploadClient {
    http: Client,
    server_url: Url,
}

impl UploadClient {
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::new(),
            server_url: Url::parse(server_url)?,
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub async fn upload_single(&self, file: UploadFile) -> Result<UploadOutcome, ClientError> {
        let form = Form::new().part("file", file.into_part()?);
        self.submit(form).await
    }

    /// Posts one `files` part per file. An empty selection still sends a
    /// single unnamed part, which is what a browser submits for an empty
    /// picker.
    pub async fn upload_batch(&self, files: Vec<UploadFile>) -> Result<UploadOutcome, ClientError> {
        let mut form = Form::new();
        if files.is_empty() {
            form = form.part("files", Part::bytes(Vec::new()).file_name(String::new()));
        }
        for file in files {
            form = form.part("files", file.into_part()?);
        }
        self.submit(form).await
    }

    pub async fn trigger_push(&self) -> Result<PushResponse, ClientError> {
        let url = self.server_url.join(TRIGGER_PUSH_PATH)?;
        let response = self.http.post(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ClientError::Decode { status, source })
    }

    async fn submit(&self, form: Form) -> Result<UploadOutcome, ClientError> {
        let url = self.server_url.join(PAGE_PATH)?;
        let response = self.http.post(url).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        let reply: UploadResponse = serde_json::from_slice(&body)
            .map_err(|source| ClientError::Decode { status, source })?;
        debug!(status, reply_status = ?reply.status, "upload reply received");
        Ok(UploadOutcome::try_from(reply)?)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

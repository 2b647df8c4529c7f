use std::sync::Arc;

use repo_publisher::{PublishItem, Publisher};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{BatchItem, UploadOutcome},
};
use storage::{allowed_formats_label, is_allowed_image, ImageStore, StoredImage};
use tracing::{error, info, warn};

const NO_FILE_PART: &str = "No file part in the request";
const NO_FILE_SELECTED: &str = "No file selected";
const NO_FILES_PART: &str = "No files part in the request";
const NO_FILES_SELECTED: &str = "No files selected";
const PROCESSING_FAILED: &str = "Error processing image. Invalid or corrupted file.";
const ALL_UPLOADS_FAILED: &str = "All uploads failed";
const BATCH_PROCESSED: &str = "Batch upload processed";
const NO_IMAGES_DIRECTORY: &str = "No images directory found.";
const NO_IMAGES_TO_PUSH: &str = "No images to push.";
const PUSH_SUCCEEDED: &str = "Successfully pushed images to GitHub.";

#[derive(Clone)]
pub struct ApiContext {
    pub store: ImageStore,
    pub publisher: Arc<dyn Publisher>,
}

/// One file part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// File fields found in an upload form. `files` is `Some` as soon as one
/// `files` part was sent, even if it carried no file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub file: Option<IncomingFile>,
    pub files: Option<Vec<IncomingFile>>,
}

impl IncomingFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    fn is_unnamed(&self) -> bool {
        self.filename.is_empty()
    }
}

fn invalid_format_message() -> String {
    format!(
        "Invalid file format. Allowed formats: {}",
        allowed_formats_label()
    )
}

async fn store_one(ctx: &ApiContext, file: &IncomingFile) -> Result<StoredImage, String> {
    if !is_allowed_image(&file.filename) {
        info!(original_name = %file.filename, "rejected upload with unsupported extension");
        return Err(invalid_format_message());
    }
    if file.bytes.is_empty() {
        warn!(original_name = %file.filename, "rejected empty upload");
        return Err(PROCESSING_FAILED.to_string());
    }
    ctx.store
        .save(&file.filename, &file.bytes)
        .await
        .map_err(|err| {
            error!(original_name = %file.filename, error = %format!("{err:#}"), "failed to store image");
            PROCESSING_FAILED.to_string()
        })
}

async fn batch_items(ctx: &ApiContext, files: &[IncomingFile]) -> Vec<BatchItem> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let item = match store_one(ctx, file).await {
            Ok(stored) => {
                let message = format!("Image saved as: {}", stored.stored_name);
                BatchItem::saved(&file.filename, stored.stored_name, Some(message))
            }
            Err(message) => BatchItem::rejected(&file.filename, Some(message)),
        };
        results.push(item);
    }
    results
}

/// `POST /api/upload`
pub async fn upload_single(ctx: &ApiContext, file: Option<IncomingFile>) -> UploadOutcome {
    let Some(file) = file else {
        return UploadOutcome::failed(NO_FILE_PART);
    };
    if file.is_unnamed() {
        return UploadOutcome::failed(NO_FILE_SELECTED);
    }

    match store_one(ctx, &file).await {
        Ok(stored) => UploadOutcome::Single {
            message: Some(format!(
                "Image uploaded and saved as: {}",
                stored.stored_name
            )),
            filename: stored.stored_name,
        },
        Err(message) => UploadOutcome::failed(message),
    }
}

/// `POST /api/batch-upload`
pub async fn upload_batch(ctx: &ApiContext, files: Option<Vec<IncomingFile>>) -> UploadOutcome {
    let Some(files) = files else {
        return UploadOutcome::failed(NO_FILES_PART);
    };
    if files.iter().all(IncomingFile::is_unnamed) {
        return UploadOutcome::failed(NO_FILES_SELECTED);
    }

    let results = batch_items(ctx, &files).await;
    let saved = results.iter().filter(|item| item.is_saved()).count();
    info!(received = files.len(), saved, "batch upload processed");

    if saved == 0 {
        return UploadOutcome::Failed {
            message: ALL_UPLOADS_FAILED.to_string(),
            results,
        };
    }
    UploadOutcome::Batch {
        results,
        message: Some(BATCH_PROCESSED.to_string()),
    }
}

/// `POST /`, as submitted by the upload page.
///
/// A `file` field gets single-upload handling. A batch never fails as a
/// whole: unnamed parts (what a browser sends for an empty picker) are
/// skipped and every other part is reported on its own.
pub async fn upload_from_page(ctx: &ApiContext, form: UploadForm) -> UploadOutcome {
    if form.file.is_some() {
        return upload_single(ctx, form.file).await;
    }
    let Some(files) = form.files else {
        return UploadOutcome::failed(NO_FILE_PART);
    };

    let named: Vec<IncomingFile> = files.into_iter().filter(|f| !f.is_unnamed()).collect();
    UploadOutcome::Batch {
        results: batch_items(ctx, &named).await,
        message: None,
    }
}

/// `POST /api/trigger-push`: publishes every spooled image, then removes the
/// files that were published.
pub async fn trigger_push(ctx: &ApiContext) -> Result<String, ApiError> {
    let pending = ctx.store.list_pending().await.map_err(internal)?;
    let Some(pending) = pending else {
        info!("publish requested but the upload directory does not exist");
        return Err(ApiError::new(ErrorCode::Validation, NO_IMAGES_DIRECTORY));
    };
    if pending.is_empty() {
        info!("publish requested with nothing spooled");
        return Err(ApiError::new(ErrorCode::Validation, NO_IMAGES_TO_PUSH));
    }
    info!(count = pending.len(), "publishing spooled images");

    let mut items = Vec::with_capacity(pending.len());
    for image in &pending {
        let bytes = ctx.store.load(image).await.map_err(push_failed)?;
        items.push(PublishItem {
            name: image.name.clone(),
            bytes,
        });
    }

    let report = ctx.publisher.publish(&items).await.map_err(push_failed)?;
    for image in &pending {
        ctx.store.remove(image).await.map_err(internal)?;
    }
    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        "publish finished; spool drained"
    );
    Ok(PUSH_SUCCEEDED.to_string())
}

fn push_failed(err: anyhow::Error) -> ApiError {
    warn!(error = %format!("{err:#}"), "publish failed");
    ApiError::new(
        ErrorCode::Upstream,
        format!("Error pushing to GitHub: {err:#}"),
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    error!(error = %format!("{err:#}"), "spool access failed");
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use repo_publisher::{DisabledPublisher, GitHubConfig, GitHubPublisher, Publisher};
use server_api::{
    trigger_push, upload_batch, upload_from_page, upload_single, ApiContext, IncomingFile,
    UploadForm,
};
use shared::{
    domain::UploadStatus,
    error::ErrorCode,
    protocol::{PushResponse, UploadOutcome, UploadResponse},
};
use storage::ImageStore;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, Settings};

const UPLOAD_PAGE: &str = include_str!("../static/upload.html");

type UploadReply = (StatusCode, Json<UploadResponse>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let api = ApiContext {
        store: ImageStore::new(&settings.upload_dir),
        publisher: build_publisher(&settings),
    };
    let app = build_router(Arc::new(AppState { api }), settings.max_upload_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        upload_dir = %settings.upload_dir.display(),
        max_upload_bytes = settings.max_upload_bytes,
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_publisher(settings: &Settings) -> Arc<dyn Publisher> {
    let Some(token) = settings.github_token.clone() else {
        warn!("GITHUB_PAT is not set; publishing to GitHub is disabled");
        return Arc::new(DisabledPublisher);
    };
    let config = GitHubConfig {
        api_url: settings.github_api_url.clone(),
        repo: settings.github_repo.clone(),
        branch: settings.github_branch.clone(),
        path_prefix: settings.github_path_prefix.clone(),
        token,
    };
    match GitHubPublisher::new(config) {
        Ok(publisher) => {
            info!(repo = publisher.repo(), branch = %settings.github_branch, "publishing to GitHub");
            Arc::new(publisher)
        }
        Err(error) => {
            warn!(%error, "publishing to GitHub is disabled");
            Arc::new(DisabledPublisher)
        }
    }
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(upload_page).post(page_upload))
        .route("/api/upload", post(api_upload))
        .route("/api/batch-upload", post(api_batch_upload))
        .route("/api/trigger-push", post(http_trigger_push))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE)
}

async fn page_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> UploadReply {
    match extract_form(multipart).await {
        Ok(form) => respond(upload_from_page(&state.api, form).await),
        Err(reply) => reply,
    }
}

async fn api_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> UploadReply {
    match extract_form(multipart).await {
        Ok(form) => respond(upload_single(&state.api, form.file).await),
        Err(reply) => reply,
    }
}

async fn api_batch_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> UploadReply {
    match extract_form(multipart).await {
        Ok(form) => respond(upload_batch(&state.api, form.files).await),
        Err(reply) => reply,
    }
}

async fn http_trigger_push(State(state): State<Arc<AppState>>) -> (StatusCode, Json<PushResponse>) {
    match trigger_push(&state.api).await {
        Ok(message) => (
            StatusCode::OK,
            Json(PushResponse {
                status: UploadStatus::Success,
                message,
            }),
        ),
        Err(error) => (
            status_for(error.code),
            Json(PushResponse {
                status: UploadStatus::Error,
                message: error.message,
            }),
        ),
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond(outcome: UploadOutcome) -> UploadReply {
    let status = if outcome.is_failure() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(outcome.into()))
}

fn failure(status: StatusCode, message: String) -> UploadReply {
    (status, Json(UploadOutcome::failed(message).into()))
}

async fn extract_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, UploadReply> {
    let multipart = multipart.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected non-multipart upload");
        failure(rejection.status(), rejection.body_text())
    })?;
    read_form(multipart).await.map_err(|error| {
        warn!(error = %error.body_text(), "failed to read upload form");
        failure(error.status(), error.body_text())
    })
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await?;
                if form.file.is_none() {
                    form.file = Some(IncomingFile::new(filename, bytes.to_vec()));
                }
            }
            "files" => {
                let bytes = field.bytes().await?;
                form.files
                    .get_or_insert_with(Vec::new)
                    .push(IncomingFile::new(filename, bytes.to_vec()));
            }
            _ => debug!(field = %name, "ignoring unexpected form field"),
        }
    }
    Ok(form)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

use super::*;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    routing::post,
    Router,
};
use shared::{
    domain::{LineKind, UploadStatus},
    protocol::BatchItem,
    render::ResultLine,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedPart {
    field: String,
    filename: String,
    content_type: Option<String>,
    size: usize,
}

#[derive(Clone)]
struct MockState {
    parts: Arc<Mutex<Vec<RecordedPart>>>,
    reply_status: StatusCode,
    reply_body: &'static str,
}

async fn record_upload(
    State(state): State<MockState>,
    mut multipart: Multipart,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
        state.parts.lock().await.push(RecordedPart {
            field: field_name,
            filename,
            content_type,
            size,
        });
    }
    reply(state).await
}

async fn reply(
    state: MockState,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    (
        state.reply_status,
        [(header::CONTENT_TYPE, "application/json")],
        state.reply_body,
    )
}

async fn push_reply(
    State(state): State<MockState>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], &'static str) {
    reply(state).await
}

async fn spawn_upload_server(
    reply_status: StatusCode,
    reply_body: &'static str,
) -> (String, Arc<Mutex<Vec<RecordedPart>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let parts = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        parts: parts.clone(),
        reply_status,
        reply_body,
    };
    let app = Router::new()
        .route("/", post(record_upload))
        .route("/api/trigger-push", post(push_reply))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), parts)
}

#[tokio::test]
async fn upload_single_posts_file_field_to_page_endpoint() {
    let (server_url, parts) = spawn_upload_server(
        StatusCode::OK,
        r#"{"status":"success","message":"Image uploaded and saved as: 01_02_24_10_11_12_0042.png","filename":"01_02_24_10_11_12_0042.png"}"#,
    )
    .await;
    let client = UploadClient::new(&server_url).expect("client");

    let outcome = client
        .upload_single(UploadFile::new("a.png", b"png-bytes".to_vec()))
        .await
        .expect("upload");

    assert_eq!(
        outcome,
        UploadOutcome::Single {
            filename: "01_02_24_10_11_12_0042.png".into(),
            message: Some("Image uploaded and saved as: 01_02_24_10_11_12_0042.png".into()),
        }
    );
    assert_eq!(
        *parts.lock().await,
        vec![RecordedPart {
            field: "file".into(),
            filename: "a.png".into(),
            content_type: Some("image/png".into()),
            size: 9,
        }]
    );
}

#[tokio::test]
async fn upload_batch_sends_one_part_per_file_in_order() {
    let (server_url, parts) = spawn_upload_server(
        StatusCode::OK,
        r#"{"status":"success","results":[
            {"filename":"x1.jpg","new_filename":"01_02_24_10_11_12_0001.jpg","status":"success"},
            {"filename":"x2.txt","status":"error","message":"Invalid file format. Allowed formats: png, jpg, jpeg, gif"}
        ]}"#,
    )
    .await;
    let client = UploadClient::new(&server_url).expect("client");

    let outcome = client
        .upload_batch(vec![
            UploadFile::new("x1.jpg", b"jpeg".to_vec()),
            UploadFile::new("x2.txt", b"text".to_vec()),
        ])
        .await
        .expect("upload");

    let UploadOutcome::Batch { results, message } = outcome else {
        panic!("expected a batch outcome");
    };
    assert_eq!(message, None);
    assert_eq!(results.len(), 2);
    assert!(results[0].is_saved());
    assert!(matches!(&results[1], BatchItem::Rejected { filename, .. } if filename == "x2.txt"));

    let recorded = parts.lock().await;
    let fields: Vec<_> = recorded
        .iter()
        .map(|part| (part.field.as_str(), part.filename.as_str()))
        .collect();
    assert_eq!(fields, vec![("files", "x1.jpg"), ("files", "x2.txt")]);
}

#[tokio::test]
async fn upload_batch_without_files_sends_empty_part() {
    let (server_url, parts) =
        spawn_upload_server(StatusCode::OK, r#"{"status":"success","results":[]}"#).await;
    let client = UploadClient::new(&server_url).expect("client");

    let outcome = client.upload_batch(Vec::new()).await.expect("upload");

    assert_eq!(
        outcome,
        UploadOutcome::Batch {
            results: Vec::new(),
            message: None,
        }
    );
    let recorded = parts.lock().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].field, "files");
    assert_eq!(recorded[0].filename, "");
    assert_eq!(recorded[0].size, 0);
}

#[tokio::test]
async fn error_status_still_decodes_reply_body() {
    let (server_url, _parts) = spawn_upload_server(
        StatusCode::BAD_REQUEST,
        r#"{"status":"error","message":"No file selected"}"#,
    )
    .await;
    let client = UploadClient::new(&server_url).expect("client");

    let outcome = client
        .upload_single(UploadFile::new("", Vec::new()))
        .await
        .expect("upload");

    assert_eq!(outcome, UploadOutcome::failed("No file selected"));
}

#[tokio::test]
async fn unreadable_body_is_reported_with_status() {
    let (server_url, _parts) =
        spawn_upload_server(StatusCode::INTERNAL_SERVER_ERROR, "<h1>boom</h1>").await;
    let client = UploadClient::new(&server_url).expect("client");

    let err = client
        .upload_single(UploadFile::new("a.png", b"png".to_vec()))
        .await
        .expect_err("html body must not decode");

    assert!(matches!(err, ClientError::Decode { status: 500, .. }), "{err}");
}

#[tokio::test]
async fn success_without_payload_is_a_protocol_error() {
    let (server_url, _parts) = spawn_upload_server(StatusCode::OK, r#"{"status":"success"}"#).await;
    let client = UploadClient::new(&server_url).expect("client");

    let err = client
        .upload_single(UploadFile::new("a.png", b"png".to_vec()))
        .await
        .expect_err("reply has no payload");

    assert!(matches!(err, ClientError::Protocol(_)), "{err}");
}

#[tokio::test]
async fn trigger_push_returns_server_message() {
    let (server_url, _parts) = spawn_upload_server(
        StatusCode::BAD_REQUEST,
        r#"{"status":"error","message":"No images to push."}"#,
    )
    .await;
    let client = UploadClient::new(&server_url).expect("client");

    let reply = client.trigger_push().await.expect("push");

    assert_eq!(reply.status, UploadStatus::Error);
    assert_eq!(reply.message, "No images to push.");
}

#[test]
fn invalid_server_url_is_rejected() {
    assert!(matches!(
        UploadClient::new("not a url"),
        Err(ClientError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn from_path_reads_bytes_and_guesses_mime() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("photo.JPG");
    std::fs::write(&path, b"jpeg-bytes").expect("write");

    let file = UploadFile::from_path(&path).await.expect("read");

    assert_eq!(file.filename, "photo.JPG");
    assert_eq!(file.mime_type.as_deref(), Some("image/jpeg"));
    assert_eq!(file.bytes, b"jpeg-bytes");
}

#[tokio::test]
async fn from_path_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = UploadFile::from_path(dir.path().join("missing.png"))
        .await
        .expect_err("file does not exist");
    assert!(matches!(err, ClientError::Read { .. }));
}

#[test]
fn board_replaces_lines_on_each_submission() {
    let board = ResultBoard::new();

    let first = board.begin();
    assert!(board.complete(first, &UploadOutcome::failed("too large")));
    assert_eq!(board.lines(), vec![ResultLine::error("too large")]);

    let second = board.begin();
    let outcome = UploadOutcome::Single {
        filename: "a.png".into(),
        message: None,
    };
    assert!(board.complete(second, &outcome));
    assert_eq!(board.lines(), vec![ResultLine::success("Uploaded: a.png")]);
}

#[test]
fn board_ignores_stale_completion() {
    let board = ResultBoard::new();
    let slow = board.begin();
    let fast = board.begin();
    assert!(slow < fast);

    let batch = UploadOutcome::Batch {
        results: vec![
            BatchItem::saved("x1.jpg", "n1.jpg", None),
            BatchItem::rejected("x2.jpg", None),
        ],
        message: None,
    };
    assert!(board.complete(fast, &batch));
    assert!(!board.complete(slow, &UploadOutcome::failed("late")));

    let kinds: Vec<_> = board.lines().into_iter().map(|line| line.kind).collect();
    assert_eq!(kinds, vec![LineKind::Success, LineKind::Error]);
}

#[test]
fn empty_batch_clears_the_board() {
    let board = ResultBoard::new();
    let first = board.begin();
    board.complete(first, &UploadOutcome::failed("No file selected"));

    let second = board.begin();
    board.complete(
        second,
        &UploadOutcome::Batch {
            results: Vec::new(),
            message: None,
        },
    );
    assert!(board.lines().is_empty());
}

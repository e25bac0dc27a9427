use super::*;
use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::{net::TcpListener, sync::oneshot};

#[derive(Clone)]
struct CaptionServerState {
    status: StatusCode,
    body: String,
    response_delay: Option<Duration>,
    hits: Arc<AtomicUsize>,
    upload_tx: Arc<Mutex<Option<oneshot::Sender<ReceivedUpload>>>>,
}

#[derive(Debug)]
struct ReceivedUpload {
    field_name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn handle_caption(
    State(state): State<CaptionServerState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut received = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let content_type = field.content_type().map(ToString::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        received = Some(ReceivedUpload {
            field_name,
            file_name,
            content_type,
            bytes,
        });
    }
    if let Some(received) = received {
        if let Some(tx) = state.upload_tx.lock().await.take() {
            let _ = tx.send(received);
        }
    }

    if let Some(delay) = state.response_delay {
        tokio::time::sleep(delay).await;
    }

    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

struct CaptionServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    upload_rx: oneshot::Receiver<ReceivedUpload>,
}

async fn spawn_caption_server(status: StatusCode, body: &str) -> CaptionServer {
    spawn_caption_server_with_delay(status, body, None).await
}

async fn spawn_caption_server_with_delay(
    status: StatusCode,
    body: &str,
    response_delay: Option<Duration>,
) -> CaptionServer {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    let hits = Arc::new(AtomicUsize::new(0));
    let state = CaptionServerState {
        status,
        body: body.to_string(),
        response_delay,
        hits: Arc::clone(&hits),
        upload_tx: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/caption", post(handle_caption))
        .route("/health", get(handle_health))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    CaptionServer {
        base_url: format!("http://{addr}"),
        hits,
        upload_rx: rx,
    }
}

/// A port nothing is listening on, for connection-refused scenarios.
async fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

fn client_for(base_url: &str) -> Arc<CaptionClient> {
    CaptionClient::new(Settings::with_base_url(base_url))
}

fn png_image_bytes() -> Vec<u8> {
    let pixels = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

fn candidate(declared: &str, name: &str) -> ImageCandidate {
    ImageCandidate {
        bytes: b"opaque-image-bytes".to_vec(),
        declared_media_type: declared.to_string(),
        file_name: Some(name.to_string()),
    }
}

fn png_candidate(name: &str) -> ImageCandidate {
    ImageCandidate {
        bytes: png_image_bytes(),
        declared_media_type: "image/png".to_string(),
        file_name: Some(name.to_string()),
    }
}

async fn next_event_matching(
    events: &mut broadcast::Receiver<SessionEvent>,
    matches: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream open");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn rejects_non_image_media_types_without_touching_selection() {
    let client = client_for("http://127.0.0.1:9");

    for declared in ["text/plain", "application/pdf", "video/mp4", "image/svg+xml"] {
        client.select_image(candidate(declared, "not-an-image")).await;
        let session = client.snapshot().await;
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.error_message.as_deref(), Some(VALIDATION_MESSAGE));
        assert!(session.selected_image.is_none(), "{declared} must not stage");
    }

    // A rejected follow-up leaves an earlier accepted selection in place.
    client.select_image(candidate("image/png", "cat.png")).await;
    client.select_image(candidate("text/plain", "notes.txt")).await;
    let session = client.snapshot().await;
    let image = session.selected_image.expect("prior selection kept");
    assert_eq!(image.file_name.as_deref(), Some("cat.png"));
    assert_eq!(session.error_message.as_deref(), Some(VALIDATION_MESSAGE));
}

#[tokio::test]
async fn rejection_leaves_a_success_status_unchanged() {
    let server = spawn_caption_server(StatusCode::OK, r#"{"caption":"a dog"}"#).await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;
    assert_eq!(client.snapshot().await.status, SessionStatus::Success);

    client.select_image(candidate("application/zip", "dog.zip")).await;
    let session = client.snapshot().await;
    assert_eq!(session.status, SessionStatus::Success);
    assert_eq!(session.caption.as_deref(), Some("a dog"));
    assert_eq!(session.error_message.as_deref(), Some(VALIDATION_MESSAGE));
}

#[tokio::test]
async fn accepts_each_supported_media_type() {
    for media_type in ImageMediaType::ACCEPTED {
        let client = client_for("http://127.0.0.1:9");
        client.select_image(candidate(media_type.as_str(), "pic")).await;

        let session = client.snapshot().await;
        let image = session.selected_image.expect("staged");
        assert_eq!(image.media_type, media_type);
        assert_eq!(image.bytes, b"opaque-image-bytes".to_vec());
        assert!(session.caption.is_none());
        assert!(session.error_message.is_none());
        assert_eq!(session.status, SessionStatus::Idle);
    }
}

#[tokio::test]
async fn declared_media_type_matching_is_case_insensitive() {
    let client = client_for("http://127.0.0.1:9");
    client.select_image(candidate("IMAGE/PNG", "shouty.png")).await;
    let session = client.snapshot().await;
    assert_eq!(
        session.selected_image.expect("staged").media_type,
        ImageMediaType::Png
    );
}

#[tokio::test]
async fn clear_image_is_idempotent() {
    let client = client_for("http://127.0.0.1:9");
    client.select_image(png_candidate("cat.png")).await;

    client.clear_image().await;
    let once = client.snapshot().await;
    client.clear_image().await;
    let twice = client.snapshot().await;

    assert_eq!(once, Session::default());
    assert_eq!(twice, once);
}

#[tokio::test]
async fn submit_without_selection_is_a_noop() {
    let client = client_for(&refused_base_url().await);
    client.submit().await;
    assert_eq!(client.snapshot().await, Session::default());
}

#[tokio::test]
async fn successful_submission_stores_caption() {
    let server = spawn_caption_server(StatusCode::OK, r#"{"caption":"a dog"}"#).await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;

    let session = client.snapshot().await;
    assert_eq!(session.status, SessionStatus::Success);
    assert_eq!(session.caption.as_deref(), Some("a dog"));
    assert!(session.error_message.is_none());
}

#[tokio::test]
async fn submission_sends_one_multipart_file_part() {
    let server = spawn_caption_server(StatusCode::OK, r#"{"caption":"ok"}"#).await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;

    let upload = server.upload_rx.await.expect("upload captured");
    assert_eq!(upload.field_name, "file");
    assert_eq!(upload.file_name.as_deref(), Some("dog.png"));
    assert_eq!(upload.content_type.as_deref(), Some("image/png"));
    assert_eq!(upload.bytes, png_image_bytes());
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn service_error_detail_becomes_error_message() {
    let server =
        spawn_caption_server(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":"model overloaded"}"#)
            .await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;

    let session = client.snapshot().await;
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.error_message.as_deref(), Some("model overloaded"));
    assert!(session.caption.is_none());
}

#[tokio::test]
async fn service_error_without_detail_embeds_status_code() {
    let server = spawn_caption_server(StatusCode::INTERNAL_SERVER_ERROR, "model exploded").await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;

    let session = client.snapshot().await;
    assert_eq!(session.status, SessionStatus::Error);
    let message = session.error_message.expect("message set");
    assert!(message.contains("500"), "unexpected message: {message}");
}

#[tokio::test]
async fn transport_failure_sets_error_state() {
    let client = client_for(&refused_base_url().await);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;

    let session = client.snapshot().await;
    assert_eq!(session.status, SessionStatus::Error);
    let message = session.error_message.expect("message set");
    assert!(!message.trim().is_empty());
    assert!(session.caption.is_none());
}

#[tokio::test]
async fn new_selection_clears_prior_success() {
    let server = spawn_caption_server(StatusCode::OK, r#"{"caption":"a dog"}"#).await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;
    assert_eq!(client.snapshot().await.status, SessionStatus::Success);

    client.select_image(png_candidate("cat.png")).await;
    let session = client.snapshot().await;
    assert_eq!(session.status, SessionStatus::Idle);
    assert!(session.caption.is_none());
    assert_eq!(
        session.selected_image.expect("staged").file_name.as_deref(),
        Some("cat.png")
    );
}

#[tokio::test]
async fn missing_or_unparseable_success_body_defaults_caption_to_empty() {
    for body in ["{}", "not json at all"] {
        let server = spawn_caption_server(StatusCode::OK, body).await;
        let client = client_for(&server.base_url);

        client.select_image(png_candidate("dog.png")).await;
        client.submit().await;

        let session = client.snapshot().await;
        assert_eq!(session.status, SessionStatus::Success, "body: {body}");
        assert_eq!(session.caption.as_deref(), Some(""), "body: {body}");
    }
}

#[tokio::test]
async fn preview_is_derived_from_selected_bytes() {
    let client = client_for("http://127.0.0.1:9");
    let mut events = client.subscribe_events();

    client.select_image(png_candidate("dog.png")).await;
    next_event_matching(&mut events, |event| {
        matches!(event, SessionEvent::PreviewReady { .. })
    })
    .await;

    let session = client.snapshot().await;
    let preview = session.preview.expect("preview derived");
    assert_eq!((preview.width, preview.height), (4, 4));
    assert_eq!(preview.rgba.len(), 4 * 4 * 4);
}

#[tokio::test]
async fn undecodable_bytes_keep_selection_but_report_preview_failure() {
    let client = client_for("http://127.0.0.1:9");
    let mut events = client.subscribe_events();

    client.select_image(candidate("image/png", "corrupt.png")).await;
    next_event_matching(&mut events, |event| {
        matches!(event, SessionEvent::PreviewFailed { .. })
    })
    .await;

    let session = client.snapshot().await;
    assert!(session.preview.is_none());
    assert!(session.selected_image.is_some());
    assert_eq!(session.status, SessionStatus::Idle);
}

#[tokio::test]
async fn stale_preview_never_lands_after_clear() {
    let client = client_for("http://127.0.0.1:9");

    client.select_image(png_candidate("dog.png")).await;
    client.clear_image().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let session = client.snapshot().await;
    assert!(session.preview.is_none());
    assert!(session.selected_image.is_none());
}

#[tokio::test]
async fn second_submit_while_uploading_is_ignored() {
    let server = spawn_caption_server_with_delay(
        StatusCode::OK,
        r#"{"caption":"slow caption"}"#,
        Some(Duration::from_millis(300)),
    )
    .await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    let in_flight = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.submit().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.snapshot().await.status, SessionStatus::Uploading);

    client.submit().await;

    in_flight.await.expect("first submit finishes");
    assert_eq!(client.snapshot().await.status, SessionStatus::Success);
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn selection_is_ignored_while_uploading() {
    let server = spawn_caption_server_with_delay(
        StatusCode::OK,
        r#"{"caption":"slow caption"}"#,
        Some(Duration::from_millis(300)),
    )
    .await;
    let client = client_for(&server.base_url);

    client.select_image(png_candidate("dog.png")).await;
    let in_flight = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.submit().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.select_image(png_candidate("cat.png")).await;

    in_flight.await.expect("first submit finishes");
    let session = client.snapshot().await;
    assert_eq!(
        session.selected_image.expect("staged").file_name.as_deref(),
        Some("dog.png")
    );
    assert_eq!(session.status, SessionStatus::Success);
}

#[tokio::test]
async fn submit_emits_upload_started_then_caption_ready() {
    let server = spawn_caption_server(StatusCode::OK, r#"{"caption":"a dog"}"#).await;
    let client = client_for(&server.base_url);
    let mut events = client.subscribe_events();

    client.select_image(png_candidate("dog.png")).await;
    client.submit().await;

    next_event_matching(&mut events, |event| {
        matches!(event, SessionEvent::UploadStarted)
    })
    .await;
    let ready = next_event_matching(&mut events, |event| {
        matches!(event, SessionEvent::CaptionReady { .. })
    })
    .await;
    match ready {
        SessionEvent::CaptionReady { caption } => assert_eq!(caption, "a dog"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn health_probe_reports_service_status() {
    let server = spawn_caption_server(StatusCode::OK, "{}").await;
    let client = client_for(&server.base_url);
    assert_eq!(client.check_health().await.expect("healthy"), "ok");

    let unreachable = client_for(&refused_base_url().await);
    let err = unreachable.check_health().await.expect_err("must fail");
    assert!(!err.message().trim().is_empty());
}

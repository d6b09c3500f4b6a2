//! Integration tests for the backend client
//!
//! Each test starts an axum server on a random local port that mimics the
//! practice backend's `/api/upload-audio` and `/api/generate-quick-task`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use capture_lib::audio::encode_wav;
use capture_lib::error::CaptureError;
use capture_lib::upload::{
    AudioBlob, GuardedUploader, HttpBackend, TaskContext, UploadBackend, UploadError,
};

/// One multipart field as the server saw it.
#[derive(Debug, Clone)]
struct SeenField {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Clone, Default)]
struct Seen {
    fields: Arc<Mutex<Vec<SeenField>>>,
    cookie: Arc<Mutex<Option<String>>>,
}

impl Seen {
    fn field(&self, name: &str) -> Option<SeenField> {
        self.fields.lock().iter().find(|f| f.name == name).cloned()
    }

    fn text(&self, name: &str) -> Option<String> {
        self.field(name)
            .map(|f| String::from_utf8(f.data).unwrap())
    }
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn record_upload(
    State(seen): State<Seen>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Json<Value> {
    *seen.cookie.lock() = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        seen.fields.lock().push(SeenField {
            name,
            file_name,
            content_type,
            data,
        });
    }

    Json(json!({
        "success": true,
        "transcription": "I think practice makes progress",
        "analysis": {
            "flow_score": 80,
            "confidence_score": 70,
            "filler_count": 2,
            "repetition_score": 90,
            "weak_words_count": 1,
            "summary": {
                "flow": "Smooth",
                "weakness": "Hedging",
                "growth_potential": "High"
            },
            "detailed_feedback": "Nice pacing.",
            "strengths": ["Clear voice"],
            "improvement_areas": ["Fewer fillers"]
        },
        "response_id": 42
    }))
}

fn one_second_blob() -> AudioBlob {
    let bytes = encode_wav(&[vec![0.25f32; 8000]], 8000).unwrap();
    AudioBlob::new(bytes, 8000, 8000)
}

#[tokio::test]
async fn upload_sends_audio_and_task_fields() {
    let seen = Seen::default();
    let router = Router::new()
        .route("/api/upload-audio", post(record_upload))
        .with_state(seen.clone());
    let base = spawn_server(router).await;

    let backend = HttpBackend::new(&format!("{}/", base), Some("session=abc123".to_string())).unwrap();
    let blob = one_second_blob();
    let expected_bytes = blob.bytes.clone();
    let task = TaskContext::level(2, Some(5), Some("Describe your morning".to_string()));

    let response = backend.upload_audio(blob, &task).await.unwrap();

    let audio = seen.field("audio").expect("audio field");
    let file_name = audio.file_name.unwrap();
    assert!(file_name.starts_with("recording_"), "{}", file_name);
    assert!(file_name.ends_with(".wav"), "{}", file_name);
    assert_eq!(audio.content_type.as_deref(), Some("audio/wav"));
    assert_eq!(audio.data, expected_bytes);

    assert_eq!(seen.text("level_number").as_deref(), Some("2"));
    assert_eq!(seen.text("task_id").as_deref(), Some("5"));
    assert_eq!(seen.text("is_quick_task").as_deref(), Some("false"));
    assert_eq!(seen.text("task_prompt").as_deref(), Some("Describe your morning"));
    assert_eq!(seen.cookie.lock().as_deref(), Some("session=abc123"));

    assert!(response.success);
    assert_eq!(
        response.transcription.as_deref(),
        Some("I think practice makes progress")
    );
    assert_eq!(response.response_id, Some(42));
    let analysis = response.analysis.unwrap();
    assert_eq!(analysis.filler_count, 2);
    assert_eq!(analysis.weak_words_count, 1);
    assert_eq!(analysis.summary.weakness, "Hedging");
    assert_eq!(analysis.improvement_areas, vec!["Fewer fillers".to_string()]);
}

#[tokio::test]
async fn quick_task_upload_omits_level_fields() {
    let seen = Seen::default();
    let router = Router::new()
        .route("/api/upload-audio", post(record_upload))
        .with_state(seen.clone());
    let base = spawn_server(router).await;

    let backend = HttpBackend::new(&base, None).unwrap();
    let task = TaskContext {
        is_quick_task: true,
        task_prompt: Some("The best advice I ever got".to_string()),
        ..Default::default()
    };
    backend.upload_audio(one_second_blob(), &task).await.unwrap();

    assert_eq!(seen.text("is_quick_task").as_deref(), Some("true"));
    assert!(seen.field("level_number").is_none());
    assert!(seen.field("task_id").is_none());
    assert!(seen.cookie.lock().is_none());
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    let router = Router::new().route(
        "/api/upload-audio",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No audio file provided" })),
            )
        }),
    );
    let base = spawn_server(router).await;
    let backend = HttpBackend::new(&base, None).unwrap();

    let err = backend
        .upload_audio(one_second_blob(), &TaskContext::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        UploadError::Api {
            status: 400,
            message: "No audio file provided".to_string()
        }
    );
    assert_eq!(
        CaptureError::from(err),
        CaptureError::UploadFailed("No audio file provided".to_string())
    );
}

#[tokio::test]
async fn plain_text_error_body_is_kept() {
    let router = Router::new().route(
        "/api/upload-audio",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response() }),
    );
    let base = spawn_server(router).await;
    let backend = HttpBackend::new(&base, None).unwrap();

    let err = backend
        .upload_audio(one_second_blob(), &TaskContext::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        UploadError::Api {
            status: 500,
            message: "upstream exploded".to_string()
        }
    );
}

#[tokio::test]
async fn unsuccessful_response_is_rejected() {
    let router = Router::new().route(
        "/api/upload-audio",
        post(|| async { Json(json!({ "success": false, "error": "Audio too quiet" })) }),
    );
    let base = spawn_server(router).await;
    let backend = HttpBackend::new(&base, None).unwrap();

    let err = backend
        .upload_audio(one_second_blob(), &TaskContext::default())
        .await
        .unwrap_err();
    assert_eq!(err, UploadError::Rejected("Audio too quiet".to_string()));
}

#[tokio::test]
async fn quick_task_is_fetched() {
    let router = Router::new().route(
        "/api/generate-quick-task",
        get(|| async {
            Json(json!({
                "sentence_starter": "If I could live anywhere,",
                "example_completion": "I would pick a town by the sea.",
                "topic_hint": "places"
            }))
        }),
    );
    let base = spawn_server(router).await;
    let backend = HttpBackend::new(&base, None).unwrap();

    let task = backend.generate_quick_task().await.unwrap();
    assert_eq!(task.sentence_starter, "If I could live anywhere,");
    assert_eq!(task.topic_hint, "places");

    let context = task.to_task_context();
    assert!(context.is_quick_task);
    assert_eq!(context.task_prompt.as_deref(), Some("If I could live anywhere,"));
}

#[tokio::test]
async fn slow_server_times_out() {
    let router = Router::new().route(
        "/api/upload-audio",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "success": true }))
        }),
    );
    let base = spawn_server(router).await;
    let backend = Arc::new(HttpBackend::new(&base, None).unwrap());
    let uploader = GuardedUploader::new(backend, Duration::from_millis(200));

    let err = uploader
        .upload(one_second_blob(), &TaskContext::default())
        .await
        .unwrap_err();
    assert_eq!(err, UploadError::TimedOut { timeout_ms: 200 });
    assert!(!uploader.is_in_flight());
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{}", addr), None).unwrap();
    let err = backend.generate_quick_task().await.unwrap_err();
    assert!(matches!(err, UploadError::Network(_)), "{:?}", err);
}

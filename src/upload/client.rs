//! HTTP client for the practice backend
//!
//! `POST /api/upload-audio` sends the WAV as multipart form data together with
//! the task metadata; `GET /api/generate-quick-task` fetches a sentence starter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use super::types::{AudioBlob, QuickTask, TaskContext, UploadResponse};

/// Transport-level bound. The upload guard applies the tighter user-facing timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur while talking to the backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error ({status}): {message}")]
    Api { status: u16, message: String },
    /// 2xx response with `success: false`
    #[error("{0}")]
    Rejected(String),
    #[error("Failed to parse server response: {0}")]
    Parse(String),
    #[error("Upload timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
    #[error("An upload is already in progress")]
    AlreadyInFlight,
}

/// Error body the backend sends with non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// The backend as seen by the capture controller.
#[async_trait]
pub trait UploadBackend: Send + Sync + 'static {
    async fn upload_audio(
        &self,
        blob: AudioBlob,
        task: &TaskContext,
    ) -> Result<UploadResponse, UploadError>;

    async fn generate_quick_task(&self) -> Result<QuickTask, UploadError>;
}

/// reqwest-backed implementation.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, session_cookie: Option<String>) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| UploadError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => request.header(reqwest::header::COOKIE, cookie),
            None => request,
        }
    }
}

/// Build the multipart form for an upload.
fn upload_form(blob: AudioBlob, task: &TaskContext) -> Result<Form, UploadError> {
    let file_name = blob.file_name();
    let audio = Part::bytes(blob.bytes)
        .file_name(file_name)
        .mime_str(AudioBlob::MIME_TYPE)
        .map_err(|e| UploadError::Parse(e.to_string()))?;

    let mut form = Form::new().part("audio", audio);
    if let Some(level) = task.level_number {
        form = form.text("level_number", level.to_string());
    }
    if let Some(task_id) = task.task_id {
        form = form.text("task_id", task_id.to_string());
    }
    form = form.text("is_quick_task", task.is_quick_task.to_string());
    if let Some(prompt) = &task.task_prompt {
        form = form.text("task_prompt", prompt.clone());
    }

    Ok(form)
}

/// Turn a non-2xx response into `UploadError::Api`, preferring the JSON `error` field.
async fn api_error(response: Response) -> UploadError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) => body,
    };

    log::error!("Backend error ({}): {}", status, message);
    UploadError::Api { status, message }
}

#[async_trait]
impl UploadBackend for HttpBackend {
    async fn upload_audio(
        &self,
        blob: AudioBlob,
        task: &TaskContext,
    ) -> Result<UploadResponse, UploadError> {
        log::info!(
            "Uploading {} ({} bytes, quick_task={}, level={:?})",
            blob.file_name(),
            blob.len(),
            task.is_quick_task,
            task.level_number
        );

        let form = upload_form(blob, task)?;
        let response = self
            .authorize(self.client.post(self.endpoint("/api/upload-audio")))
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(e.to_string()))?;

        if !parsed.success {
            let message = parsed
                .error
                .clone()
                .unwrap_or_else(|| "Server did not accept the recording".to_string());
            log::warn!("Upload rejected: {}", message);
            return Err(UploadError::Rejected(message));
        }

        log::info!(
            "Upload successful: {} transcription chars, analysis={}",
            parsed.transcription.as_deref().map(str::len).unwrap_or(0),
            parsed.analysis.is_some()
        );
        Ok(parsed)
    }

    async fn generate_quick_task(&self) -> Result<QuickTask, UploadError> {
        let response = self
            .authorize(self.client.get(self.endpoint("/api/generate-quick-task")))
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        response
            .json::<QuickTask>()
            .await
            .map_err(|e| UploadError::Parse(e.to_string()))
    }
}

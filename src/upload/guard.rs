//! Single-flight, time-bounded uploads
//!
//! At most one upload is in flight. A second request while one is outstanding
//! returns `AlreadyInFlight` without reaching the backend. Each upload is
//! bounded by a fixed timeout; on expiry the request future is dropped, which
//! cancels it, and the caller sees `TimedOut`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::client::{UploadBackend, UploadError};
use super::types::{AudioBlob, QuickTask, TaskContext, UploadResponse};

pub struct GuardedUploader {
    backend: Arc<dyn UploadBackend>,
    timeout: Duration,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag on every exit path, including cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl GuardedUploader {
    pub fn new(backend: Arc<dyn UploadBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn upload(
        &self,
        blob: AudioBlob,
        task: &TaskContext,
    ) -> Result<UploadResponse, UploadError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Upload ignored: another upload is in flight");
            return Err(UploadError::AlreadyInFlight);
        }
        let _guard = InFlight(&self.in_flight);

        match tokio::time::timeout(self.timeout, self.backend.upload_audio(blob, task)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                log::warn!("Upload cancelled after {}ms timeout", timeout_ms);
                Err(UploadError::TimedOut { timeout_ms })
            }
        }
    }

    /// Quick tasks bypass the single-flight guard; they never overlap with capture.
    pub async fn generate_quick_task(&self) -> Result<QuickTask, UploadError> {
        match tokio::time::timeout(self.timeout, self.backend.generate_quick_task()).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::TimedOut {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Backend that blocks each upload until released.
    struct GatedBackend {
        calls: AtomicUsize,
        release: Notify,
        dropped: AtomicBool,
    }

    struct DropFlag<'a>(&'a AtomicBool);

    impl Drop for DropFlag<'_> {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl GatedBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
                dropped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl UploadBackend for GatedBackend {
        async fn upload_audio(
            &self,
            _blob: AudioBlob,
            _task: &TaskContext,
        ) -> Result<UploadResponse, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _flag = DropFlag(&self.dropped);
            self.release.notified().await;
            Ok(UploadResponse {
                success: true,
                ..Default::default()
            })
        }

        async fn generate_quick_task(&self) -> Result<QuickTask, UploadError> {
            std::future::pending().await
        }
    }

    fn blob() -> AudioBlob {
        AudioBlob::new(vec![0; 64], 44_100, 10)
    }

    #[tokio::test]
    async fn second_upload_while_in_flight_is_dropped() {
        let backend = GatedBackend::new();
        let uploader = Arc::new(GuardedUploader::new(backend.clone(), Duration::from_secs(5)));

        let first = {
            let uploader = uploader.clone();
            tokio::spawn(async move { uploader.upload(blob(), &TaskContext::default()).await })
        };

        // Let the first upload reach the backend
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(uploader.is_in_flight());

        let second = uploader.upload(blob(), &TaskContext::default()).await;
        assert_eq!(second, Err(UploadError::AlreadyInFlight));

        backend.release.notify_one();
        let first = first.await.unwrap();
        assert!(first.is_ok());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(!uploader.is_in_flight());
    }

    #[tokio::test]
    async fn timeout_cancels_request_and_releases_guard() {
        let backend = GatedBackend::new();
        let uploader = GuardedUploader::new(backend.clone(), Duration::from_millis(30));

        let result = uploader.upload(blob(), &TaskContext::default()).await;
        assert_eq!(result, Err(UploadError::TimedOut { timeout_ms: 30 }));
        assert!(backend.dropped.load(Ordering::SeqCst), "request future was not dropped");
        assert!(!uploader.is_in_flight());
    }

    #[tokio::test]
    async fn quick_task_timeout() {
        let uploader = GuardedUploader::new(GatedBackend::new(), Duration::from_millis(10));
        let result = uploader.generate_quick_task().await;
        assert_eq!(result, Err(UploadError::TimedOut { timeout_ms: 10 }));
    }
}

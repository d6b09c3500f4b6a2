//! User-facing error kinds for a capture attempt.
//!
//! Every variant is recoverable: the controller surfaces the message (unless
//! it is `ConcurrentOperationIgnored`) and returns to Idle.

use crate::upload::UploadError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    /// Microphone permission was refused or no usable input device exists.
    #[error("Could not access the microphone: {0}")]
    DeviceAccessDenied(String),

    #[error("No audio was captured. Check your microphone and try again.")]
    EmptyCapture,

    #[error("Recording too short ({duration_ms}ms). Please speak for at least {min_ms}ms.")]
    TooShortCapture { duration_ms: u64, min_ms: u64 },

    #[error("Recorded audio is too small ({bytes} bytes, need {min_bytes}). The capture may be silent or corrupt.")]
    TooSmallEncoding { bytes: usize, min_bytes: usize },

    /// The samples could not be written as a WAV file (e.g. an unsupported device rate).
    #[error("Could not encode the recording: {0}")]
    EncodingFailed(String),

    #[error("Upload timed out after {timeout_ms}ms. Please try again.")]
    UploadTimeout { timeout_ms: u64 },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// A request arrived while another operation was in flight. Never shown to the user.
    #[error("Another operation is already in progress")]
    ConcurrentOperationIgnored,
}

impl CaptureError {
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, CaptureError::ConcurrentOperationIgnored)
    }

    /// Short machine-readable tag, used in logs and UI state.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::DeviceAccessDenied(_) => "device_access_denied",
            CaptureError::EmptyCapture => "empty_capture",
            CaptureError::TooShortCapture { .. } => "too_short_capture",
            CaptureError::TooSmallEncoding { .. } => "too_small_encoding",
            CaptureError::EncodingFailed(_) => "encoding_failed",
            CaptureError::UploadTimeout { .. } => "upload_timeout",
            CaptureError::UploadFailed(_) => "upload_failed",
            CaptureError::ConcurrentOperationIgnored => "concurrent_operation_ignored",
        }
    }
}

impl From<UploadError> for CaptureError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TimedOut { timeout_ms } => CaptureError::UploadTimeout { timeout_ms },
            UploadError::AlreadyInFlight => CaptureError::ConcurrentOperationIgnored,
            // Prefer the server's own wording when it sent one
            UploadError::Api { message, .. } if !message.is_empty() => {
                CaptureError::UploadFailed(message)
            }
            UploadError::Rejected(message) => CaptureError::UploadFailed(message),
            other => CaptureError::UploadFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_have_distinct_messages() {
        let messages = [
            CaptureError::EmptyCapture.to_string(),
            CaptureError::TooShortCapture {
                duration_ms: 500,
                min_ms: 1000,
            }
            .to_string(),
            CaptureError::TooSmallEncoding {
                bytes: 44,
                min_bytes: 1000,
            }
            .to_string(),
        ];
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert_ne!(messages[0], messages[2]);
        assert!(messages[1].contains("500ms"));
    }

    #[test]
    fn concurrent_operation_is_not_user_visible() {
        assert!(!CaptureError::ConcurrentOperationIgnored.is_user_visible());
        assert!(CaptureError::EmptyCapture.is_user_visible());
    }

    #[test]
    fn upload_errors_map_to_capture_errors() {
        assert_eq!(
            CaptureError::from(UploadError::TimedOut { timeout_ms: 30_000 }),
            CaptureError::UploadTimeout { timeout_ms: 30_000 }
        );
        assert_eq!(
            CaptureError::from(UploadError::Api {
                status: 500,
                message: "Processing failed".to_string(),
            }),
            CaptureError::UploadFailed("Processing failed".to_string())
        );
        assert_eq!(
            CaptureError::from(UploadError::AlreadyInFlight),
            CaptureError::ConcurrentOperationIgnored
        );
    }
}

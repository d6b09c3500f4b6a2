//! Acceptance checks around WAV encoding.

use super::buffer::CapturedAudio;
use super::wav::encode_wav;
use crate::error::CaptureError;
use crate::upload::AudioBlob;

/// Thresholds a capture must meet before it is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    /// Minimum audio duration.
    pub min_capture_ms: u64,
    /// Minimum size of the encoded WAV, header included.
    pub min_encoded_bytes: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            min_capture_ms: 1000,
            min_encoded_bytes: 1000,
        }
    }
}

/// Minimum sample count for `min_ms` of audio at `sample_rate`, rounded up.
fn min_samples(sample_rate: u32, min_ms: u64) -> u64 {
    (sample_rate as u64 * min_ms).div_ceil(1000)
}

/// Validate the captured samples, encode them, and validate the result.
///
/// Checks run in order: empty capture, too short, too small after encoding.
pub fn encode_capture(
    capture: &CapturedAudio,
    limits: &CaptureLimits,
) -> Result<AudioBlob, CaptureError> {
    let sample_count = capture.sample_count();
    if sample_count == 0 {
        return Err(CaptureError::EmptyCapture);
    }

    if (sample_count as u64) < min_samples(capture.sample_rate, limits.min_capture_ms) {
        return Err(CaptureError::TooShortCapture {
            duration_ms: capture.duration_ms(),
            min_ms: limits.min_capture_ms,
        });
    }

    let bytes = encode_wav(&capture.blocks, capture.sample_rate)
        .map_err(|e| CaptureError::EncodingFailed(e.to_string()))?;
    if bytes.len() < limits.min_encoded_bytes {
        return Err(CaptureError::TooSmallEncoding {
            bytes: bytes.len(),
            min_bytes: limits.min_encoded_bytes,
        });
    }

    log::debug!(
        "Encoded {} samples at {} Hz into {} bytes",
        sample_count,
        capture.sample_rate,
        bytes.len()
    );

    Ok(AudioBlob::new(bytes, capture.sample_rate, sample_count))
}

//! Audio capture module
//!
//! Microphone capture (CPAL), the per-session sample buffer, the PCM16 WAV
//! encoder and its acceptance checks, and the live level meter.

mod buffer;
pub mod level;
mod paths;
pub mod recorder;
pub mod validate;
pub mod wav;

pub use buffer::{CapturedAudio, SampleBuffer};
pub use level::run_level_meter;
pub use paths::{cleanup_old_recordings, recordings_dir, save_recording, MAX_RECORDINGS};
pub use recorder::{AudioError, AudioSource, AudioStream, CaptureConstraints, CpalMicrophone};
pub use validate::{encode_capture, CaptureLimits};
pub use wav::{encode_wav, WavError, WavInfo, MAX_SAMPLE_RATE, WAV_HEADER_SIZE};

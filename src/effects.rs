//! Effect runner for the capture controller
//!
//! This module handles executing effects produced by the state machine.
//! Every effect runs on its own task and reports back through the event
//! channel; the state loop decides what the result means.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::{
    cleanup_old_recordings, encode_capture, recordings_dir, run_level_meter, save_recording,
    AudioSource, AudioStream, CaptureConstraints, CaptureLimits, CapturedAudio, SampleBuffer,
    MAX_RECORDINGS,
};
use crate::error::CaptureError;
use crate::settings::AppSettings;
use crate::state_machine::{Effect, Event};
use crate::ui::Presenter;
use crate::upload::{AudioBlob, GuardedUploader, UploadError};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Tunables for the runner, usually derived from `AppSettings`.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub constraints: CaptureConstraints,
    pub limits: CaptureLimits,
    pub settle_delay: Duration,
    pub level_frame: Duration,
    /// Where encoded recordings are kept, if at all.
    pub recordings_dir: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            constraints: CaptureConstraints::mono(settings.sample_rate),
            limits: settings.limits(),
            settle_delay: settings.settle_delay(),
            level_frame: settings.level_frame(),
            recordings_dir: settings.keep_recordings.then(recordings_dir),
        }
    }
}

/// Everything a live session holds between StartAudio and StopAudio/Cleanup.
struct ActiveCapture {
    stream: Option<Box<dyn AudioStream>>,
    buffer: SampleBuffer,
    level_cancel: CancellationToken,
    sample_rate: u32,
}

async fn release_stream(stream: Option<Box<dyn AudioStream>>) {
    let Some(stream) = stream else {
        return;
    };
    if let Err(e) = tokio::task::spawn_blocking(move || stream.stop()).await {
        log::error!("Audio stream shutdown task failed: {}", e);
    }
}

/// Real effect runner: microphone via an `AudioSource`, uploads via a
/// `GuardedUploader`.
pub struct CaptureEffectRunner {
    source: Arc<dyn AudioSource>,
    uploader: Arc<GuardedUploader>,
    presenter: Arc<dyn Presenter>,
    config: RunnerConfig,
    active_captures: Arc<Mutex<HashMap<Uuid, ActiveCapture>>>,
}

impl CaptureEffectRunner {
    pub fn new(
        source: Arc<dyn AudioSource>,
        uploader: Arc<GuardedUploader>,
        presenter: Arc<dyn Presenter>,
        config: RunnerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            uploader,
            presenter,
            config,
            active_captures: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Number of sessions currently holding a device (for tests and status).
    pub async fn active_count(&self) -> usize {
        self.active_captures.lock().await.len()
    }
}

impl EffectRunner for CaptureEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartAudio { id } => {
                let source = self.source.clone();
                let presenter = self.presenter.clone();
                let active = self.active_captures.clone();
                let constraints = self.config.constraints;
                let level_frame = self.config.level_frame;

                tokio::spawn(async move {
                    let buffer = SampleBuffer::new();
                    let stream_buffer = buffer.clone();

                    // Opening a device can block on a permission prompt or driver
                    let opened = tokio::task::spawn_blocking(move || {
                        source.request_access(&constraints, stream_buffer)
                    })
                    .await;

                    let stream = match opened {
                        Ok(Ok(stream)) => stream,
                        Ok(Err(e)) => {
                            log::error!("Failed to start audio capture: {}", e);
                            let _ = tx
                                .send(Event::AudioStartFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                        Err(e) => {
                            log::error!("Audio start task failed: {}", e);
                            let _ = tx
                                .send(Event::AudioStartFail {
                                    id,
                                    err: format!("audio start task failed: {}", e),
                                })
                                .await;
                            return;
                        }
                    };

                    let sample_rate = stream.sample_rate();
                    log::info!("Audio capture started at {} Hz (session {})", sample_rate, id);

                    let level_cancel = CancellationToken::new();
                    tokio::spawn(run_level_meter(
                        buffer.clone(),
                        presenter,
                        level_frame,
                        level_cancel.clone(),
                    ));

                    {
                        let mut active_guard = active.lock().await;
                        active_guard.insert(
                            id,
                            ActiveCapture {
                                stream: Some(stream),
                                buffer,
                                level_cancel,
                                sample_rate,
                            },
                        );
                    }

                    let _ = tx.send(Event::AudioStartOk { id, sample_rate }).await;
                });
            }

            Effect::StopAudio { id } => {
                let active = self.active_captures.clone();
                let settle_delay = self.config.settle_delay;

                tokio::spawn(async move {
                    let capture = {
                        let mut active_guard = active.lock().await;
                        active_guard.remove(&id)
                    };

                    // Already released by Cleanup; the session is gone
                    let Some(mut capture) = capture else {
                        log::debug!("StopAudio: no active capture for id={}", id);
                        return;
                    };

                    capture.level_cancel.cancel();
                    capture.buffer.stop_accumulating();
                    release_stream(capture.stream.take()).await;

                    // Let a callback that was mid-flight at stop time finish
                    tokio::time::sleep(settle_delay).await;

                    let audio = CapturedAudio {
                        blocks: capture.buffer.take_blocks(),
                        sample_rate: capture.sample_rate,
                    };
                    log::info!(
                        "Audio capture stopped: {} samples (session {})",
                        audio.sample_count(),
                        id
                    );

                    let _ = tx.send(Event::AudioStopped { id, capture: audio }).await;
                });
            }

            Effect::StartRecordingTick { id } => {
                let active = self.active_captures.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(1));
                    loop {
                        interval.tick().await;
                        let is_active = {
                            let guard = active.lock().await;
                            guard.contains_key(&id)
                        };
                        if !is_active {
                            log::debug!("Recording tick stopping - session {} no longer active", id);
                            break;
                        }
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            log::debug!("Recording tick stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::Encode { id, capture } => {
                let limits = self.config.limits;
                let keep_dir = self.config.recordings_dir.clone();

                tokio::spawn(async move {
                    let encoded = tokio::task::spawn_blocking(move || -> Result<AudioBlob, CaptureError> {
                        let blob = encode_capture(&capture, &limits)?;
                        if let Some(dir) = keep_dir {
                            if let Err(e) = save_recording(&dir, &blob) {
                                log::warn!("Failed to keep recording copy: {}", e);
                            }
                        }
                        Ok(blob)
                    })
                    .await;

                    let event = match encoded {
                        Ok(Ok(blob)) => {
                            log::info!("Encoded {} bytes (session {})", blob.len(), id);
                            Event::EncodeOk { id, blob }
                        }
                        Ok(Err(err)) => Event::EncodeFail { id, err },
                        Err(e) => {
                            log::error!("Encode task failed: {}", e);
                            Event::EncodeFail {
                                id,
                                err: CaptureError::EncodingFailed(format!(
                                    "encode task failed: {}",
                                    e
                                )),
                            }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::Upload { id, blob, task } => {
                let uploader = self.uploader.clone();

                tokio::spawn(async move {
                    log::info!("Uploading {} for session {}", blob.file_name(), id);

                    // Inner task so a panic in the client still yields an event
                    let upload =
                        tokio::spawn(async move { uploader.upload(blob, &task).await }).await;

                    let event = match upload {
                        Ok(Ok(response)) => {
                            log::info!("Upload complete (session {})", id);
                            Event::UploadOk { id, response }
                        }
                        Ok(Err(UploadError::AlreadyInFlight)) => {
                            // The session still has to leave Uploading
                            log::debug!("Upload for session {} dropped: another is in flight", id);
                            Event::UploadFail {
                                id,
                                err: CaptureError::ConcurrentOperationIgnored,
                            }
                        }
                        Ok(Err(e)) => {
                            log::error!("Upload failed: {}", e);
                            Event::UploadFail {
                                id,
                                err: CaptureError::from(e),
                            }
                        }
                        Err(e) => {
                            log::error!("Upload task failed: {}", e);
                            Event::UploadFail {
                                id,
                                err: CaptureError::UploadFailed(format!("upload task failed: {}", e)),
                            }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::Cleanup { id } => {
                let active = self.active_captures.clone();
                let keep_dir = self.config.recordings_dir.clone();

                tokio::spawn(async move {
                    let capture = {
                        let mut active_guard = active.lock().await;
                        active_guard.remove(&id)
                    };

                    if let Some(mut capture) = capture {
                        log::debug!("Cleanup: releasing capture for session {}", id);
                        capture.level_cancel.cancel();
                        capture.buffer.stop_accumulating();
                        capture.buffer.clear();
                        release_stream(capture.stream.take()).await;
                    }

                    if let Some(dir) = keep_dir {
                        let pruned = tokio::task::spawn_blocking(move || {
                            cleanup_old_recordings(&dir, MAX_RECORDINGS)
                        })
                        .await;
                        match pruned {
                            Ok(Ok(count)) if count > 0 => {
                                log::info!("Cleaned up {} old recordings", count);
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => log::warn!("Failed to cleanup old recordings: {}", e),
                            Err(e) => log::warn!("Recording cleanup task failed: {}", e),
                        }
                    }
                });
            }

            Effect::ShowError { .. } | Effect::ShowFeedback { .. } | Effect::EmitUi => {
                // Handled in the main loop, not here
                unreachable!("presentation effects are handled in run_state_loop");
            }
        }
    }
}

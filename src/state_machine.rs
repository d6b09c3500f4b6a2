//! State machine for the capture controller
//!
//! This module implements the recording lifecycle using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute.
//!
//! Idle -> Recording -> Processing -> Uploading -> Idle. Every path back to
//! Idle carries a `Cleanup` effect so device, ticker, level meter and samples
//! are released no matter how the attempt ended.

use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audio::CapturedAudio;
use crate::error::CaptureError;
use crate::upload::{AudioBlob, TaskContext, UploadResponse};

/// Recordings are stopped automatically after this long.
pub const MAX_RECORDING: Duration = Duration::from_secs(120);

/// Internal state of the capture workflow.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone, Default)]
pub enum State {
    #[default]
    Idle,
    Recording {
        session_id: Uuid,
        task: TaskContext,
        started_at: Instant,
    },
    Processing {
        session_id: Uuid,
        task: TaskContext,
    },
    Uploading {
        session_id: Uuid,
    },
}

impl State {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Recording { session_id, .. }
            | State::Processing { session_id, .. }
            | State::Uploading { session_id } => Some(*session_id),
        }
    }
}

/// Events that can trigger state transitions.
/// Sent by the controller handle (user intent) and by the effect runner (completions).
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start recording for this task
    StartRequested { task: TaskContext },
    /// User asked to stop recording
    StopRequested,
    /// Abandon the current attempt (ignored while uploading)
    Reset,
    /// Shut the state loop down
    Exit,
    /// Elapsed-time tick while recording (includes id to prevent stale ticks)
    RecordingTick { id: Uuid },

    // Audio events
    AudioStartOk { id: Uuid, sample_rate: u32 },
    AudioStartFail { id: Uuid, err: String },
    AudioStopped { id: Uuid, capture: CapturedAudio },

    // Encoding events
    EncodeOk { id: Uuid, blob: AudioBlob },
    EncodeFail { id: Uuid, err: CaptureError },

    // Upload events
    UploadOk { id: Uuid, response: UploadResponse },
    UploadFail { id: Uuid, err: CaptureError },
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    StartAudio {
        id: Uuid,
    },
    /// Stop accumulation, release the device, then report the captured audio
    StopAudio {
        id: Uuid,
    },
    /// Start sending RecordingTick events every second while recording
    StartRecordingTick {
        id: Uuid,
    },
    Encode {
        id: Uuid,
        capture: CapturedAudio,
    },
    Upload {
        id: Uuid,
        blob: AudioBlob,
        task: TaskContext,
    },
    /// Release everything the session holds
    Cleanup {
        id: Uuid,
    },
    /// Surface an error to the user (handled by the state loop)
    ShowError {
        error: CaptureError,
    },
    /// Render the server's feedback (handled by the state loop)
    ShowFeedback {
        response: UploadResponse,
    },
    /// Signal to emit UI state to the presenter
    EmitUi,
}

fn back_to_idle(id: Uuid, notice: Option<Effect>) -> (State, Vec<Effect>) {
    let mut effects = vec![Effect::Cleanup { id }];
    effects.extend(notice);
    effects.push(Effect::EmitUi);
    (State::Idle, effects)
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Start/stop requests that don't fit the current state are no-ops
/// - Ignore events with stale session IDs, except `AudioStartOk`, which always
///   gets a `StopAudio` so a late device is released
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id = state.session_id();
    let is_current = |eid: Uuid| current_id == Some(eid);

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartRequested { task }) => {
            let id = Uuid::new_v4();
            log::info!("Capture session {} starting", id);
            (
                Recording {
                    session_id: id,
                    task,
                    started_at: Instant::now(),
                },
                vec![StartAudio { id }, EmitUi],
            )
        }
        (Idle, StopRequested) => {
            log::debug!("Stop ignored: not recording");
            (Idle, vec![])
        }
        (Idle, Reset) => (Idle, vec![]),

        // -----------------
        // Recording
        // -----------------
        (Recording { session_id, .. }, AudioStartOk { id, sample_rate }) if *session_id == id => {
            log::debug!("Session {} capturing at {} Hz", id, sample_rate);
            (state.clone(), vec![StartRecordingTick { id }, EmitUi])
        }
        (Recording { session_id, .. }, AudioStartFail { id, err }) if *session_id == id => {
            log::warn!("Session {} could not open microphone: {}", id, err);
            back_to_idle(
                id,
                Some(ShowError {
                    error: CaptureError::DeviceAccessDenied(err),
                }),
            )
        }
        (
            Recording {
                session_id, task, ..
            },
            StopRequested,
        ) => (
            Processing {
                session_id: *session_id,
                task: task.clone(),
            },
            vec![StopAudio { id: *session_id }, EmitUi],
        ),
        (
            Recording {
                session_id,
                task,
                started_at,
            },
            RecordingTick { id },
        ) if *session_id == id => {
            let elapsed = started_at.elapsed();
            if elapsed >= MAX_RECORDING {
                log::warn!(
                    "Recording {} auto-stopped after {:?} (max duration reached)",
                    session_id,
                    elapsed
                );
                (
                    Processing {
                        session_id: *session_id,
                        task: task.clone(),
                    },
                    vec![StopAudio { id: *session_id }, EmitUi],
                )
            } else {
                (state.clone(), vec![EmitUi])
            }
        }
        (Recording { session_id, .. }, Reset) => {
            log::info!("Recording {} reset", session_id);
            back_to_idle(*session_id, None)
        }

        // -----------------
        // Processing
        // -----------------
        // Stop arrived before the device finished opening: release it now
        (Processing { session_id, .. }, AudioStartOk { id, .. }) if *session_id == id => {
            (state.clone(), vec![StopAudio { id }])
        }
        (Processing { session_id, .. }, AudioStartFail { id, err }) if *session_id == id => {
            back_to_idle(
                id,
                Some(ShowError {
                    error: CaptureError::DeviceAccessDenied(err),
                }),
            )
        }
        (Processing { session_id, .. }, AudioStopped { id, capture }) if *session_id == id => {
            log::info!(
                "Session {} captured {} samples ({}ms)",
                id,
                capture.sample_count(),
                capture.duration_ms()
            );
            (state.clone(), vec![Encode { id, capture }])
        }
        (Processing { session_id, task }, EncodeOk { id, blob }) if *session_id == id => (
            Uploading { session_id: id },
            vec![
                Upload {
                    id,
                    blob,
                    task: task.clone(),
                },
                EmitUi,
            ],
        ),
        (Processing { session_id, .. }, EncodeFail { id, err }) if *session_id == id => {
            log::info!("Session {} rejected before upload: {}", id, err);
            back_to_idle(id, Some(ShowError { error: err }))
        }
        (Processing { session_id, .. }, Reset) => back_to_idle(*session_id, None),

        // -----------------
        // Uploading
        // -----------------
        (Uploading { session_id }, UploadOk { id, response }) if *session_id == id => {
            back_to_idle(id, Some(ShowFeedback { response }))
        }
        (Uploading { session_id }, UploadFail { id, err }) if *session_id == id => {
            let notice = err.is_user_visible().then_some(ShowError { error: err });
            back_to_idle(id, notice)
        }
        (Uploading { .. }, Reset) => {
            log::debug!("Reset ignored: upload in flight");
            (state.clone(), vec![])
        }

        // -----------------
        // Busy: duplicate start/stop requests are no-ops
        // -----------------
        (Recording { .. } | Processing { .. } | Uploading { .. }, StartRequested { .. }) => {
            log::debug!("Start ignored: {}", CaptureError::ConcurrentOperationIgnored);
            (state.clone(), vec![])
        }
        (Processing { .. } | Uploading { .. }, StopRequested) => {
            log::debug!("Stop ignored: not recording");
            (state.clone(), vec![])
        }

        // -----------------
        // Stale events
        // -----------------
        // A device that opened for an abandoned session must still be released
        (_, AudioStartOk { id, .. }) => {
            log::debug!("Releasing device for stale session {}", id);
            (state.clone(), vec![StopAudio { id }])
        }
        (_, ev) => {
            if let Some(id) = event_id(&ev) {
                if !is_current(id) {
                    log::debug!("Dropping stale event for session {}", id);
                }
            }
            (state.clone(), vec![])
        }
    }
}

fn event_id(event: &Event) -> Option<Uuid> {
    match event {
        Event::RecordingTick { id }
        | Event::AudioStartOk { id, .. }
        | Event::AudioStartFail { id, .. }
        | Event::AudioStopped { id, .. }
        | Event::EncodeOk { id, .. }
        | Event::EncodeFail { id, .. }
        | Event::UploadOk { id, .. }
        | Event::UploadFail { id, .. } => Some(*id),
        Event::StartRequested { .. } | Event::StopRequested | Event::Reset | Event::Exit => None,
    }
}

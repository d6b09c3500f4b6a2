pub mod audio;
mod cli;
pub mod effects;
pub mod error;
pub mod feedback;
pub mod settings;
pub mod state_machine;
pub mod ui;
pub mod upload;

use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use effects::EffectRunner;
use state_machine::{reduce, Effect, Event, State};
use ui::{state_to_ui, Phase, Presenter};
use upload::TaskContext;

/// Emit a UI state update to the presenter
fn emit_ui_state(presenter: &dyn Presenter, state: &State) {
    let ui_state = state_to_ui(state);
    log::debug!("Emitting UI state: {:?}", serde_json::to_string(&ui_state));
    presenter.state_changed(&ui_state);
}

/// Handle to a running controller. Cheap to clone; every clone drives the same state loop.
#[derive(Clone)]
pub struct CaptureController {
    tx: mpsc::Sender<Event>,
    phase: watch::Receiver<Phase>,
}

impl CaptureController {
    /// Begin a recording for `task`. A no-op unless the controller is Idle.
    pub async fn start(&self, task: TaskContext) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(Event::StartRequested { task }).await
    }

    /// Finish the recording and hand it to encode + upload. A no-op unless Recording.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(Event::StopRequested).await
    }

    /// Abandon the current attempt and return to Idle (ignored while uploading).
    pub async fn reset(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(Event::Reset).await
    }

    /// Stop the state loop. The loop's JoinHandle completes afterwards.
    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(Event::Exit).await
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }
}

/// Start the state loop on the current tokio runtime.
pub fn spawn_controller(
    effect_runner: Arc<dyn EffectRunner>,
    presenter: Arc<dyn Presenter>,
) -> (CaptureController, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Event>(32);
    let (phase_tx, phase_rx) = watch::channel(Phase::Idle);

    let tx_for_loop = tx.clone();
    let handle = tokio::spawn(async move {
        run_state_loop(rx, tx_for_loop, effect_runner, presenter, phase_tx).await;
    });

    (
        CaptureController {
            tx,
            phase: phase_rx,
        },
        handle,
    )
}

/// Run the main state loop
async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    presenter: Arc<dyn Presenter>,
    phase_tx: watch::Sender<Phase>,
) {
    let mut state = State::default();

    // Emit initial state
    emit_ui_state(presenter.as_ref(), &state);
    log::info!("State loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down state loop");
            break;
        }

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        let new_discriminant = std::mem::discriminant(&next);

        if old_discriminant != new_discriminant {
            log::info!("State transition: {:?} -> {:?}", state, next);
        }

        state = next;

        let phase = Phase::from(&state);
        phase_tx.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });

        for eff in effects {
            match eff {
                Effect::EmitUi => emit_ui_state(presenter.as_ref(), &state),
                Effect::ShowError { error } => {
                    log::warn!("Capture error ({}): {}", error.kind(), error);
                    if error.is_user_visible() {
                        presenter.error(&error);
                    }
                }
                Effect::ShowFeedback { response } => presenter.feedback(&response),
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    log::info!("State loop ended");
}

// ============================================================================
// Application entry point
// ============================================================================

pub fn run() -> ExitCode {
    cli::main()
}

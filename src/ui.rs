//! Presentation of controller state
//!
//! The state loop and effect runner never print directly; they call a
//! `Presenter`. `TerminalPresenter` renders to stdout for the CLI.

use std::io::Write;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::CaptureError;
use crate::feedback::render_feedback;
use crate::state_machine::State;
use crate::upload::UploadResponse;

/// Coarse lifecycle phase, published after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Recording,
    Processing,
    Uploading,
}

impl From<&State> for Phase {
    fn from(state: &State) -> Self {
        match state {
            State::Idle => Phase::Idle,
            State::Recording { .. } => Phase::Recording,
            State::Processing { .. } => Phase::Processing,
            State::Uploading { .. } => Phase::Uploading,
        }
    }
}

/// UI state sent to the presenter.
/// Uses tagged union format: { "status": "idle" } or { "status": "recording", "elapsedSecs": 5 }
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Processing,
    Uploading,
}

/// Convert internal State to UiState for display
pub fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Recording { started_at, .. } => UiState::Recording {
            elapsed_secs: started_at.elapsed().as_secs(),
        },
        State::Processing { .. } => UiState::Processing,
        State::Uploading { .. } => UiState::Uploading,
    }
}

/// Receives everything the user should see.
pub trait Presenter: Send + Sync + 'static {
    fn state_changed(&self, ui: &UiState);
    /// Smoothed input level in 0.0..=1.0, roughly once per frame while recording.
    fn level(&self, level: f32);
    fn error(&self, err: &CaptureError);
    fn feedback(&self, response: &UploadResponse);
}

const METER_WIDTH: usize = 30;

/// Contents of the line redrawn in place while recording.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LiveLine {
    elapsed_secs: u64,
    level: f32,
}

/// Renders to stdout. While recording, the timer and the level meter share
/// one line that is redrawn in place.
#[derive(Debug, Default)]
pub struct TerminalPresenter {
    live: Mutex<Option<LiveLine>>,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn redraw(line: &LiveLine) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{}", recording_line(line.elapsed_secs, line.level));
        let _ = out.flush();
    }

    /// Moves past the live line so the next message starts on a fresh row.
    fn end_live_line(&self) {
        if self.live.lock().take().is_some() {
            println!();
        }
    }
}

pub fn level_bar(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(METER_WIDTH - filled))
}

/// Fixed-width for recordings under 100 minutes, so each redraw fully
/// covers the previous one.
pub fn recording_line(elapsed_secs: u64, level: f32) -> String {
    format!(
        "Recording {:02}:{:02} {}  (Enter to stop)",
        elapsed_secs / 60,
        elapsed_secs % 60,
        level_bar(level)
    )
}

impl Presenter for TerminalPresenter {
    fn state_changed(&self, ui: &UiState) {
        let line = match ui {
            UiState::Recording { elapsed_secs } => {
                let mut live = self.live.lock();
                let line = live.get_or_insert_with(LiveLine::default);
                line.elapsed_secs = *elapsed_secs;
                Self::redraw(line);
                return;
            }
            UiState::Idle => "Ready. Press Enter to start recording.",
            UiState::Processing => "Processing audio...",
            UiState::Uploading => "Uploading for analysis...",
        };
        self.end_live_line();
        println!("{}", line);
    }

    fn level(&self, level: f32) {
        // A late frame after recording ended has no line to draw on
        let mut live = self.live.lock();
        if let Some(line) = live.as_mut() {
            line.level = level;
            Self::redraw(line);
        }
    }

    fn error(&self, err: &CaptureError) {
        self.end_live_line();
        println!("Error: {}", err);
    }

    fn feedback(&self, response: &UploadResponse) {
        self.end_live_line();
        println!("{}", render_feedback(response));
    }
}

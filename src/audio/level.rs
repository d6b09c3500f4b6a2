//! Live input level for the recording indicator
//!
//! While a session records, a task polls the session's sample buffer once per
//! frame, computes the RMS of the most recent samples, applies EMA smoothing
//! and hands the value to the presenter. The task ends when its cancellation
//! token fires (on stop, reset or cleanup). Purely cosmetic: it never touches
//! the captured data beyond reading it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use super::buffer::SampleBuffer;
use crate::ui::Presenter;

/// Samples considered per frame (~46ms at 44.1kHz)
const LEVEL_WINDOW: usize = 2048;

/// EMA smoothing factor (0.3 = 30% new value, 70% previous)
const EMA_ALPHA: f32 = 0.3;

/// Exponential moving average over successive level readings.
#[derive(Debug, Default)]
pub struct LevelSmoother {
    prev: f32,
    initialized: bool,
}

impl LevelSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooth `level` against the previous reading.
    pub fn apply(&mut self, level: f32) -> f32 {
        if !self.initialized {
            self.prev = level;
            self.initialized = true;
            return level;
        }
        let smoothed = EMA_ALPHA * level + (1.0 - EMA_ALPHA) * self.prev;
        self.prev = smoothed;
        smoothed
    }

    pub fn reset(&mut self) {
        self.prev = 0.0;
        self.initialized = false;
    }
}

/// Poll `buffer` every `frame` and report the smoothed level until cancelled
/// or until the buffer stops accumulating.
pub async fn run_level_meter(
    buffer: SampleBuffer,
    presenter: Arc<dyn Presenter>,
    frame: Duration,
    cancel: CancellationToken,
) {
    let mut smoother = LevelSmoother::new();
    let mut tick = interval(frame);

    log::debug!("Level meter started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Level meter cancelled");
                break;
            }
            _ = tick.tick() => {
                if !buffer.is_recording() {
                    break;
                }
                let level = smoother.apply(buffer.recent_rms(LEVEL_WINDOW));
                presenter.level(level);
            }
        }
    }

    smoother.reset();
    log::debug!("Level meter stopped");
}

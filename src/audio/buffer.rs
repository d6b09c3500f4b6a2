//! Shared sample store for one capture session
//!
//! The audio callback appends blocks while the recording flag is set; the
//! controller flips the flag off on stop and then drains the blocks. Appends
//! after the flag is cleared are dropped, so the drained data is immutable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Mono float samples captured for one session, with the rate they were captured at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedAudio {
    pub blocks: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn sample_count(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count() as u64 * 1000) / self.sample_rate as u64
    }
}

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    blocks: Arc<Mutex<Vec<Vec<f32>>>>,
    recording: Arc<AtomicBool>,
}

impl SampleBuffer {
    /// New buffer, already accepting samples.
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(Mutex::new(Vec::new())),
            recording: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Append one callback's worth of samples. Returns false if accumulation has stopped.
    pub fn push_block(&self, block: &[f32]) -> bool {
        if !self.recording.load(Ordering::SeqCst) {
            return false;
        }
        let mut blocks = self.blocks.lock();
        // Re-check under the lock so nothing lands after a drain
        if !self.recording.load(Ordering::SeqCst) {
            return false;
        }
        blocks.push(block.to_vec());
        true
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn stop_accumulating(&self) {
        let _guard = self.blocks.lock();
        self.recording.store(false, Ordering::SeqCst);
    }

    /// Drain all blocks in insertion order. Stops accumulation first.
    pub fn take_blocks(&self) -> Vec<Vec<f32>> {
        let mut blocks = self.blocks.lock();
        self.recording.store(false, Ordering::SeqCst);
        std::mem::take(&mut *blocks)
    }

    pub fn clear(&self) {
        self.blocks.lock().clear();
    }

    pub fn sample_count(&self) -> usize {
        self.blocks.lock().iter().map(Vec::len).sum()
    }

    /// RMS over the most recent `window` samples (0.0 when empty).
    pub fn recent_rms(&self, window: usize) -> f32 {
        let blocks = self.blocks.lock();
        let mut remaining = window;
        let mut sum_squares = 0.0f64;
        let mut count = 0usize;

        for block in blocks.iter().rev() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(block.len());
            for &s in &block[block.len() - take..] {
                let s = s.clamp(-1.0, 1.0) as f64;
                sum_squares += s * s;
            }
            count += take;
            remaining -= take;
        }

        if count == 0 {
            return 0.0;
        }
        ((sum_squares / count as f64).sqrt() as f32).clamp(0.0, 1.0)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

//! Microphone access using CPAL
//!
//! `AudioSource` is the platform capability the controller consumes:
//! request access with constraints, receive periodic sample blocks in a
//! `SampleBuffer`, and stop the stream. `CpalMicrophone` implements it on the
//! default input device. The cpal `Stream` is not `Send`, so it lives on a
//! dedicated audio thread; the returned handle talks to that thread over a
//! channel and joins it on stop, which releases the device.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::buffer::SampleBuffer;

/// Errors that can occur while acquiring the microphone.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoInputDevice,
    #[error("No supported audio configuration")]
    NoSupportedConfig,
    #[error("Failed to create audio stream: {0}")]
    StreamCreationFailed(String),
    #[error("Audio thread failed: {0}")]
    ThreadFailed(String),
}

/// What the caller asks of the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureConstraints {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

/// An open input stream. Dropping it must also release the device.
pub trait AudioStream: Send {
    /// Rate the device actually delivers, which may differ from the request.
    fn sample_rate(&self) -> u32;
    /// Stop all capture and release the device.
    fn stop(self: Box<Self>);
}

/// Platform microphone capability.
pub trait AudioSource: Send + Sync + 'static {
    /// Open the input device and start appending mono blocks to `buffer`.
    /// Blocking; call from a blocking context.
    fn request_access(
        &self,
        constraints: &CaptureConstraints,
        buffer: SampleBuffer,
    ) -> Result<Box<dyn AudioStream>, AudioError>;
}

/// Default input device via CPAL.
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }

    /// Check that a default input device exists (for status display).
    pub fn default_device_name() -> Result<String, AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;
        Ok(device.name().unwrap_or_else(|_| "unknown".to_string()))
    }
}

impl AudioSource for CpalMicrophone {
    fn request_access(
        &self,
        constraints: &CaptureConstraints,
        buffer: SampleBuffer,
    ) -> Result<Box<dyn AudioStream>, AudioError> {
        let constraints = *constraints;
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, AudioError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let (stream, sample_rate) = match open_stream(&constraints, buffer) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(sample_rate));

                // Park until stop is requested or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("Audio thread released input stream");
            })
            .map_err(|e| AudioError::ThreadFailed(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| AudioError::ThreadFailed("audio thread exited early".to_string()))??;

        log::info!("Microphone opened at {} Hz", sample_rate);

        Ok(Box::new(CpalStream {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            sample_rate,
        }))
    }
}

struct CpalStream {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalStream {
    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio thread panicked during shutdown");
            }
        }
    }
}

impl AudioStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(mut self: Box<Self>) {
        self.shutdown();
        log::info!("Microphone released");
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Prefer a native mono config at the requested rate; otherwise take the
/// device default and downmix in the callback.
fn select_config(
    device: &Device,
    constraints: &CaptureConstraints,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let wanted = cpal::SampleRate(constraints.sample_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            let usable_format = matches!(
                range.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            );
            if usable_format
                && range.channels() == constraints.channels
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
            {
                let supported = range.with_sample_rate(wanted);
                return Ok((supported.config(), supported.sample_format()));
            }
        }
    }

    let fallback = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;
    log::warn!(
        "No native {}ch/{}Hz input config, using device default ({}ch/{}Hz)",
        constraints.channels,
        constraints.sample_rate,
        fallback.channels(),
        fallback.sample_rate().0
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn open_stream(
    constraints: &CaptureConstraints,
    buffer: SampleBuffer,
) -> Result<(Stream, u32), AudioError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let (config, sample_format) = select_config(&device, constraints)?;
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, buffer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, buffer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, buffer)?,
        _ => return Err(AudioError::NoSupportedConfig),
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e)))?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    buffer: SampleBuffer,
) -> Result<Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let err_fn = |err: cpal::StreamError| log::error!("Audio stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                buffer.push_block(&downmix_to_mono(&samples, channels));
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))
}

/// Average interleaved frames down to one channel.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_mono_is_passthrough() {
        assert_eq!(downmix_to_mono(&[0.1, 0.2, 0.3], 1), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn downmix_stereo_averages_frames() {
        let mono = downmix_to_mono(&[1.0, 0.0, -0.5, -0.5, 0.25, 0.75], 2);
        assert_eq!(mono, vec![0.5, -0.5, 0.5]);
    }

    #[test]
    fn downmix_drops_partial_frame() {
        assert_eq!(downmix_to_mono(&[0.2, 0.4, 0.6], 2).len(), 1);
    }

    #[test]
    fn mono_constraints() {
        let c = CaptureConstraints::mono(44_100);
        assert_eq!(c.channels, 1);
        assert_eq!(c.sample_rate, 44_100);
    }
}

//! Minimal PCM16 mono WAV encoding
//!
//! Produces the canonical 44-byte RIFF/WAVE header followed by little-endian
//! signed 16-bit samples. Output length is always `44 + 2 * N`.

/// Size of the RIFF/WAVE header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: usize = 2;

/// Highest sample rate accepted for capture and encoding.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Errors from writing or reading a WAV header.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WavError {
    #[error("WAV data too short: {0} bytes (need at least 44)")]
    TooShort(usize),
    #[error("Missing {0} marker")]
    MissingMarker(&'static str),
    #[error("Unsupported WAV format tag {0} (only PCM is supported)")]
    UnsupportedFormat(u16),
    #[error("Unsupported sample rate {0} Hz (expected 1..={max})", max = MAX_SAMPLE_RATE)]
    SampleRateOutOfRange(u32),
    #[error("Too many samples for a WAV file: {0}")]
    DataTooLarge(usize),
}

/// Quantize one float sample to PCM16: `round(clamp(x, -1, 1) * 32767)`.
pub fn quantize(sample: f32) -> i16 {
    // NaN clamps to NaN and casts to 0
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Build the 44-byte header for `sample_count` mono PCM16 samples.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  1 (PCM)
/// [22-23]  1 (mono)
/// [24-27]  sample_rate
/// [28-31]  sample_rate * 2
/// [32-33]  2
/// [34-35]  16
/// [36-39]  "data"
/// [40-43]  data_size = sample_count * 2
/// ```
///
/// Every size field must fit in a u32, so rates outside `1..=MAX_SAMPLE_RATE`
/// and data over 4 GiB are rejected.
pub fn wav_header(sample_rate: u32, sample_count: usize) -> Result<[u8; WAV_HEADER_SIZE], WavError> {
    if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
        return Err(WavError::SampleRateOutOfRange(sample_rate));
    }
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let data_size = sample_count
        .checked_mul(BYTES_PER_SAMPLE)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .filter(|bytes| bytes.checked_add(36).is_some())
        .ok_or(WavError::DataTooLarge(sample_count))?;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    Ok(header)
}

/// Encode ordered float sample blocks as a mono PCM16 WAV file.
///
/// Blocks are concatenated in order; the function is pure and deterministic.
pub fn encode_wav<B: AsRef<[f32]>>(blocks: &[B], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let sample_count: usize = blocks.iter().map(|b| b.as_ref().len()).sum();
    let header = wav_header(sample_rate, sample_count)?;

    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + sample_count * BYTES_PER_SAMPLE);
    out.extend_from_slice(&header);

    for block in blocks {
        for &sample in block.as_ref() {
            out.extend_from_slice(&quantize(sample).to_le_bytes());
        }
    }

    Ok(out)
}

/// Header fields of a PCM WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavInfo {
    /// Parse the fixed 44-byte header produced by [`encode_wav`].
    pub fn parse(bytes: &[u8]) -> Result<Self, WavError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(WavError::TooShort(bytes.len()));
        }
        if &bytes[0..4] != b"RIFF" {
            return Err(WavError::MissingMarker("RIFF"));
        }
        if &bytes[8..12] != b"WAVE" {
            return Err(WavError::MissingMarker("WAVE"));
        }
        if &bytes[12..16] != b"fmt " {
            return Err(WavError::MissingMarker("fmt "));
        }
        if &bytes[36..40] != b"data" {
            return Err(WavError::MissingMarker("data"));
        }

        let format = u16::from_le_bytes([bytes[20], bytes[21]]);
        if format != 1 {
            return Err(WavError::UnsupportedFormat(format));
        }

        Ok(Self {
            channels: u16::from_le_bytes([bytes[22], bytes[23]]),
            sample_rate: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            bits_per_sample: u16::from_le_bytes([bytes[34], bytes[35]]),
            data_size: u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]),
        })
    }

    pub fn sample_count(&self) -> u64 {
        let frame_bytes = (self.channels as u64 * self.bits_per_sample as u64 / 8).max(1);
        self.data_size as u64 / frame_bytes
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }
}

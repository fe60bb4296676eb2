//! Audio format contract and PCM16 byte-layout helpers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};

/// Sample rate used on the wire. WebRTC Opus always runs a 48 kHz clock (RFC 7587).
pub const SAMPLE_RATE: u32 = 48000;

/// Channel count of both the capture track and the playback sink.
pub const CHANNELS: u8 = 1;

/// Duration of one PCM frame.
pub const FRAME_DURATION_MS: u32 = 20;

/// Samples per channel in one 20ms frame at 48 kHz.
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE / 1000 * FRAME_DURATION_MS) as usize;

/// Sample rates libopus accepts.
const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Complete audio format specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u8,
    /// Bits per sample.
    pub bits_per_sample: u8,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_48khz_mono()
    }
}

impl AudioFormat {
    /// Create a new audio format specification.
    pub fn new(sample_rate: u32, channels: u8, bits_per_sample: u8) -> Self {
        Self { sample_rate, channels, bits_per_sample }
    }

    /// Mono PCM16 at 48 kHz, the format negotiated for the realtime session.
    pub fn pcm16_48khz_mono() -> Self {
        Self { sample_rate: SAMPLE_RATE, channels: CHANNELS, bits_per_sample: 16 }
    }

    /// Bytes per sample for a single channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Calculate bytes per second for this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (self.bits_per_sample / 8) as u32
    }

    /// Calculate duration in milliseconds for a given number of bytes.
    pub fn duration_ms(&self, bytes: usize) -> f64 {
        let bytes_per_ms = self.bytes_per_second() as f64 / 1000.0;
        bytes as f64 / bytes_per_ms
    }

    /// Samples per channel in one frame of `FRAME_DURATION_MS`.
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate / 1000 * FRAME_DURATION_MS) as usize
    }

    /// Check the capture/playback contract: mono, 16-bit, and a rate Opus can code.
    pub fn validate(&self) -> Result<()> {
        if self.channels != 1 {
            return Err(VoiceError::device(format!(
                "unsupported channel count {}: capture must be mono",
                self.channels
            )));
        }
        if self.bits_per_sample != 16 {
            return Err(VoiceError::device(format!(
                "unsupported sample size {} bits: capture must be 16-bit",
                self.bits_per_sample
            )));
        }
        if !OPUS_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(VoiceError::device(format!(
                "unsupported sample rate {} Hz: must be one of {:?}",
                self.sample_rate, OPUS_SAMPLE_RATES
            )));
        }
        Ok(())
    }
}

/// Pack i16 samples into little-endian bytes (low byte first).
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

/// Unpack little-endian bytes into i16 samples.
///
/// Fails if the byte count is odd.
pub fn le_bytes_to_pcm16(data: &[u8]) -> Result<Vec<i16>> {
    if data.len() % 2 != 0 {
        return Err(VoiceError::decode(format!(
            "Invalid data length for PCM16: {} (must be even)",
            data.len()
        )));
    }
    Ok(data.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect())
}

/// Convert a normalized f32 sample to i16, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert an i16 sample to a normalized f32.
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Re-frames arbitrarily sized capture callbacks into fixed-size frames.
///
/// Device callbacks deliver whatever the driver's period happens to be;
/// the encoder needs exactly one 20ms frame per call.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    buffer: Vec<i16>,
    frame_len: usize,
}

impl FrameAccumulator {
    /// Create an accumulator emitting frames of `frame_len` samples.
    pub fn new(frame_len: usize) -> Self {
        Self { buffer: Vec::with_capacity(frame_len * 2), frame_len }
    }

    /// Push new samples into the accumulator.
    pub fn push(&mut self, samples: &[i16]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Pop one complete frame if enough samples have accumulated.
    pub fn pop_frame(&mut self) -> Option<Vec<i16>> {
        if self.buffer.len() < self.frame_len {
            return None;
        }
        let rest = self.buffer.split_off(self.frame_len);
        Some(std::mem::replace(&mut self.buffer, rest))
    }

    /// Number of samples waiting for a full frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

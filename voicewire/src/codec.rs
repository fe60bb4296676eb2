//! Opus codec wrapping `audiopus`.
//!
//! The remote model sends Opus at 48 kHz mono; the decoder turns each RTP
//! payload into PCM16 samples. The encoder is used by the capture path to
//! compress 20 ms microphone frames before they are written to the local track.

use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Channels, MutSignals, SampleRate};

use crate::audio::AudioFormat;
use crate::consumer::{DecoderFactory, FrameDecoder};
use crate::error::{Result, VoiceError};

/// Upper bound for one encoded frame. Matches the datagram-safe payload size
/// used for outbound packets.
pub const MAX_ENCODED_FRAME_BYTES: usize = 1000;

/// Samples per channel in the longest Opus frame (120 ms at 48 kHz).
const MAX_DECODED_SAMPLES_PER_CHANNEL: usize = 5760;

fn opus_params(format: &AudioFormat) -> Result<(SampleRate, Channels)> {
    let sample_rate = SampleRate::try_from(format.sample_rate as i32).map_err(|e| {
        VoiceError::decode(format!("Invalid Opus sample rate {}: {e}", format.sample_rate))
    })?;

    let channels = match format.channels {
        1 => Channels::Mono,
        2 => Channels::Stereo,
        other => {
            return Err(VoiceError::decode(format!(
                "Invalid channel count {other}: must be 1 (mono) or 2 (stereo)"
            )));
        }
    };

    Ok((sample_rate, channels))
}

/// Opus decoder bound to one sample rate and channel count.
pub struct OpusDecoder {
    decoder: Decoder,
    channels: usize,
}

impl OpusDecoder {
    /// Create a decoder for `format`.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if Opus does not support the rate or channel count.
    pub fn new(format: &AudioFormat) -> Result<Self> {
        let (sample_rate, channels) = opus_params(format)?;
        let decoder = Decoder::new(sample_rate, channels)
            .map_err(|e| VoiceError::decode(format!("Failed to create Opus decoder: {e}")))?;
        Ok(Self { decoder, channels: format.channels as usize })
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        let mut output = vec![0i16; MAX_DECODED_SAMPLES_PER_CHANNEL * self.channels];

        let packet = audiopus::packet::Packet::try_from(payload)
            .map_err(|e| VoiceError::decode(format!("Invalid Opus packet: {e}")))?;
        let signals = MutSignals::try_from(output.as_mut_slice())
            .map_err(|e| VoiceError::decode(format!("Failed to create output buffer: {e}")))?;

        let per_channel = self
            .decoder
            .decode(Some(packet), signals, false)
            .map_err(|e| VoiceError::decode(format!("Opus decode failed: {e}")))?;

        output.truncate(per_channel * self.channels);
        Ok(output)
    }
}

/// Builds an [`OpusDecoder`] per remote track.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusDecoderFactory;

impl DecoderFactory for OpusDecoderFactory {
    fn create(&self, format: &AudioFormat) -> Result<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusDecoder::new(format)?))
    }
}

/// Opus encoder in VoIP mode.
pub struct OpusEncoder {
    encoder: Encoder,
}

impl OpusEncoder {
    /// Create an encoder for `format`.
    pub fn new(format: &AudioFormat) -> Result<Self> {
        let (sample_rate, channels) = opus_params(format)?;
        let encoder = Encoder::new(sample_rate, channels, Application::Voip)
            .map_err(|e| VoiceError::decode(format!("Failed to create Opus encoder: {e}")))?;
        Ok(Self { encoder })
    }

    /// Encode one frame of PCM16 samples.
    ///
    /// `pcm` must hold exactly one Opus frame (2.5, 5, 10, 20, 40 or 60 ms).
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; MAX_ENCODED_FRAME_BYTES];
        let len = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| VoiceError::decode(format!("Opus encode failed: {e}")))?;
        output.truncate(len);
        Ok(output)
    }
}

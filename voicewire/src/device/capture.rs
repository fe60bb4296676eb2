use std::sync::Arc;

use cpal::traits::DeviceTrait;
use tracing::{error, info};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::{StreamThread, input_device, stream_config};
use crate::audio::{AudioFormat, f32_to_i16};
use crate::error::{Result, VoiceError};
use crate::rtc::{LocalAudioWriter, new_local_audio_track};
use crate::source::{CaptureDevice, CapturedTrack};

/// Microphone capture through cpal.
///
/// Each request opens the device, starts an Opus writer feeding a fresh local
/// track and returns that track. The device stays open until the returned
/// [`CapturedTrack`] is dropped.
///
/// Opening blocks the calling thread until the input stream is playing.
#[derive(Debug, Clone, Default)]
pub struct CpalCapture {
    device_name: Option<String>,
}

impl CpalCapture {
    /// Capture from the default input device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture from the input device with this name.
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

/// Keeps the input stream and the encoder task alive. Fields drop in order,
/// so the device stops before the writer.
struct CaptureResources {
    _stream: StreamThread,
    _writer: LocalAudioWriter,
}

impl CaptureDevice for CpalCapture {
    type Track = TrackLocalStaticSample;

    fn request_capture_tracks(
        &self,
        format: &AudioFormat,
    ) -> Result<Vec<CapturedTrack<TrackLocalStaticSample>>> {
        let track = new_local_audio_track(format);
        let writer = LocalAudioWriter::spawn(Arc::clone(&track), *format)?;
        let tx = writer.sender();

        let device_name = self.device_name.clone();
        let config = stream_config(format);

        let stream = StreamThread::spawn("voicewire-capture", move || {
            let device = input_device(device_name.as_deref())?;
            info!(device = ?device.name().ok(), "Opening input device");

            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let samples: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                        // The callback must not block; drop the chunk if the encoder lags.
                        let _ = tx.try_send(samples);
                    },
                    move |err| {
                        error!(error = %err, "Audio capture error");
                    },
                    None,
                )
                .map_err(|e| VoiceError::device(format!("Failed to build input stream: {e}")))
        })?;

        Ok(vec![CapturedTrack::with_resource(
            track,
            CaptureResources { _stream: stream, _writer: writer },
        )])
    }
}

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::audio::{AudioFormat, FRAME_DURATION_MS, FrameAccumulator};
use crate::codec::OpusEncoder;
use crate::error::{Result, VoiceError};

/// Captured chunks queued between the device callback and the encoder task.
const PCM_QUEUE_DEPTH: usize = 64;

/// Encodes captured PCM into 20 ms Opus samples on the outbound track.
///
/// Chunks of any length are accepted; they are regrouped into whole frames
/// before encoding. Dropping the writer stops the task.
pub struct LocalAudioWriter {
    tx: mpsc::Sender<Vec<i16>>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl LocalAudioWriter {
    /// Start the encoder task for `track`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(track: Arc<TrackLocalStaticSample>, format: AudioFormat) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| VoiceError::device(format!("Audio writer needs a Tokio runtime: {e}")))?;
        let encoder = OpusEncoder::new(&format)?;
        let (tx, rx) = mpsc::channel(PCM_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let join = runtime.spawn(write_loop(track, format, encoder, rx, cancel.clone()));
        Ok(Self { tx, cancel, join: Some(join) })
    }

    /// A handle for pushing captured PCM chunks.
    pub fn sender(&self) -> mpsc::Sender<Vec<i16>> {
        self.tx.clone()
    }
}

impl Drop for LocalAudioWriter {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

async fn write_loop(
    track: Arc<TrackLocalStaticSample>,
    format: AudioFormat,
    mut encoder: OpusEncoder,
    mut rx: mpsc::Receiver<Vec<i16>>,
    cancel: CancellationToken,
) {
    let mut frames = FrameAccumulator::new(format.frame_samples());
    let frame_duration = Duration::from_millis(FRAME_DURATION_MS as u64);

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            chunk = rx.recv() => match chunk {
                Some(chunk) => chunk,
                None => break,
            },
        };

        frames.push(&chunk);
        while let Some(frame) = frames.pop_frame() {
            let encoded = match encoder.encode(&frame) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(error = %e, "Failed to encode capture frame");
                    continue;
                }
            };

            let sample = Sample {
                data: encoded.into(),
                duration: frame_duration,
                timestamp: SystemTime::now(),
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                warn!(error = %e, "Failed to write capture sample");
            }
        }
    }

    debug!(pending = frames.pending(), "Capture writer stopped");
}

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::DeviceTrait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{StreamThread, join_worker, output_device, stream_config};
use crate::audio::{AudioFormat, i16_to_f32, le_bytes_to_pcm16};
use crate::buffer::RingBufferReader;
use crate::consumer::{PlaybackSink, SinkFactory};
use crate::error::{Result, VoiceError};

/// How long the pump waits for decoded audio before re-checking for shutdown.
const PUMP_POLL: Duration = Duration::from_millis(50);

/// Opens speaker playback through cpal.
///
/// `open` blocks the calling thread until the output stream is playing.
#[derive(Debug, Clone, Default)]
pub struct CpalSinkFactory {
    device_name: Option<String>,
}

impl CpalSinkFactory {
    /// Play through the default output device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Play through the output device with this name.
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

/// An open cpal output stream fed from a ring buffer.
///
/// A pump thread blocks on the ring buffer and moves samples into a queue the
/// output callback drains. The callback plays silence when the queue is empty.
pub struct CpalSink {
    _stream: StreamThread,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    underruns: Arc<AtomicU64>,
}

impl CpalSink {
    /// Output callbacks that found the queue empty.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl PlaybackSink for CpalSink {}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            join_worker("voicewire-playback-pump", pump);
        }
        debug!(underruns = self.underruns(), "Playback sink closed");
    }
}

fn pump_loop(
    reader: RingBufferReader,
    queue: Arc<Mutex<VecDeque<f32>>>,
    chunk_bytes: usize,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        let Some(bytes) = reader.buffer().read_timeout(chunk_bytes, PUMP_POLL) else {
            continue;
        };
        match le_bytes_to_pcm16(&bytes) {
            Ok(samples) => queue.lock().extend(samples.into_iter().map(i16_to_f32)),
            Err(e) => warn!(error = %e, "Dropping malformed PCM chunk"),
        }
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(
        &self,
        format: &AudioFormat,
        reader: RingBufferReader,
    ) -> Result<Box<dyn PlaybackSink>> {
        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let underruns = Arc::new(AtomicU64::new(0));

        let device_name = self.device_name.clone();
        let config = stream_config(format);
        let callback_queue = Arc::clone(&queue);
        let callback_underruns = Arc::clone(&underruns);

        let stream = StreamThread::spawn("voicewire-playback", move || {
            let device = output_device(device_name.as_deref())?;
            info!(device = ?device.name().ok(), "Opening output device");

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut queue = callback_queue.lock();
                        let mut starved = false;
                        for sample in data.iter_mut() {
                            *sample = queue.pop_front().unwrap_or_else(|| {
                                starved = true;
                                0.0
                            });
                        }
                        if starved {
                            callback_underruns.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        error!(error = %err, "Audio playback error");
                    },
                    None,
                )
                .map_err(|e| VoiceError::device(format!("Failed to build output stream: {e}")))
        })?;

        // One frame per pull keeps latency at the 20 ms packet cadence.
        let chunk_bytes =
            format.frame_samples() * format.channels as usize * format.bytes_per_sample();
        let stop = Arc::new(AtomicBool::new(false));
        let pump_stop = Arc::clone(&stop);
        let pump = std::thread::Builder::new()
            .name("voicewire-playback-pump".to_string())
            .spawn(move || pump_loop(reader, queue, chunk_bytes, pump_stop))
            .map_err(|e| VoiceError::device(format!("Failed to spawn playback pump: {e}")))?;

        Ok(Box::new(CpalSink { _stream: stream, stop, pump: Some(pump), underruns }))
    }
}

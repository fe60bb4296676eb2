//! Remote-track consumer: network packets in, PCM bytes out.
//!
//! One consumer runs per remote audio track for the whole life of the track.
//! It moves through three states:
//!
//! ```text
//! Initializing ──(decoder + sink ok)──▶ Streaming ──(track closed / cancelled)──▶ Terminated
//!       │                                                                            ▲
//!       └──────────────────────────(decoder or sink failed)──────────────────────────┘
//! ```
//!
//! While streaming, a failed read or a packet that does not decode is logged,
//! counted and skipped. Only structural closure of the track (or session
//! cancellation) ends the loop. Appends to the ring buffer never wait for the
//! playback side.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioFormat, pcm16_to_le_bytes};
use crate::buffer::{FrameRingBuffer, RingBufferReader};
use crate::config::DEFAULT_MAX_CONSECUTIVE_READ_ERRORS;
use crate::error::Result;
use crate::transport::RemoteTrack;

/// Turns one encoded payload into PCM samples.
pub trait FrameDecoder: Send {
    /// Decode a payload into interleaved i16 samples.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>>;
}

/// Builds a decoder bound to a sample rate and channel count.
pub trait DecoderFactory: Send + Sync {
    /// Create a decoder for `format`.
    fn create(&self, format: &AudioFormat) -> Result<Box<dyn FrameDecoder>>;
}

/// An open playback device pulling from a ring buffer.
///
/// Dropping the sink releases the device.
pub trait PlaybackSink: Send {}

/// Opens playback sinks.
pub trait SinkFactory: Send + Sync {
    /// Open a sink playing `format` audio pulled from `reader`.
    fn open(&self, format: &AudioFormat, reader: RingBufferReader) -> Result<Box<dyn PlaybackSink>>;
}

/// Lifecycle state of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Building the decoder and opening the sink.
    Initializing,
    /// Pulling and decoding packets.
    Streaming,
    /// Finished; no more packets are pulled.
    Terminated,
}

/// Why a consumer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The decoder could not be constructed.
    DecoderFailed,
    /// The playback sink could not be opened.
    SinkFailed,
    /// The track signalled permanent closure.
    TrackClosed,
    /// Reads failed back-to-back more often than the configured ceiling.
    ReadErrorCeiling,
    /// The owning session was closed.
    Cancelled,
    /// The consumer task panicked.
    Panicked,
}

/// Packet-level counters for one consumer.
#[derive(Debug, Default)]
pub struct StreamStats {
    packets: AtomicU64,
    read_errors: AtomicU64,
    decode_errors: AtomicU64,
    empty_payloads: AtomicU64,
    bytes_written: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Packets pulled from the track.
    pub packets: u64,
    /// Failed reads.
    pub read_errors: u64,
    /// Packets that failed to decode.
    pub decode_errors: u64,
    /// Packets skipped because they carried no payload.
    pub empty_payloads: u64,
    /// PCM bytes appended to the ring buffer.
    pub bytes_written: u64,
}

impl StreamStats {
    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            empty_payloads: self.empty_payloads.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Converts one remote track's packets into a continuous PCM byte stream.
pub struct RemoteTrackConsumer<R: RemoteTrack + ?Sized> {
    track: Arc<R>,
    format: AudioFormat,
    buffer: Arc<FrameRingBuffer>,
    decoders: Arc<dyn DecoderFactory>,
    sinks: Arc<dyn SinkFactory>,
    stats: Arc<StreamStats>,
    state: watch::Sender<ConsumerState>,
    cancel: CancellationToken,
    max_consecutive_read_errors: u32,
}

impl<R: RemoteTrack + ?Sized + 'static> RemoteTrackConsumer<R> {
    /// Create a consumer for `track` with a fresh unbounded ring buffer.
    pub fn new(
        track: Arc<R>,
        format: AudioFormat,
        decoders: Arc<dyn DecoderFactory>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Initializing);
        Self {
            track,
            format,
            buffer: Arc::new(FrameRingBuffer::new()),
            decoders,
            sinks,
            stats: Arc::new(StreamStats::default()),
            state,
            cancel: CancellationToken::new(),
            max_consecutive_read_errors: DEFAULT_MAX_CONSECUTIVE_READ_ERRORS,
        }
    }

    /// Use a specific ring buffer instead of a fresh one.
    pub fn with_buffer(mut self, buffer: Arc<FrameRingBuffer>) -> Self {
        self.buffer = buffer;
        self
    }

    /// Stop when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Treat `max` back-to-back read failures as closure. `0` disables the ceiling.
    pub fn with_max_consecutive_read_errors(mut self, max: u32) -> Self {
        self.max_consecutive_read_errors = max;
        self
    }

    /// The ring buffer this consumer feeds.
    pub fn buffer(&self) -> &Arc<FrameRingBuffer> {
        &self.buffer
    }

    /// Counters for this consumer.
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    /// Watch the consumer's state.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run the consumer on a new task.
    pub fn spawn(self) -> ConsumerHandle {
        let handle = ConsumerHandle {
            track_id: self.track.id(),
            buffer: Arc::clone(&self.buffer),
            stats: Arc::clone(&self.stats),
            state: self.state.subscribe(),
            cancel: self.cancel.clone(),
            join: None,
        };
        let join = tokio::spawn(self.run());
        ConsumerHandle { join: Some(join), ..handle }
    }

    /// Run the consumer to completion on the current task.
    pub async fn run(self) -> TerminationReason {
        let track_id = self.track.id();
        // Also covers unwinding, so watchers never see a dead consumer as live.
        let _terminated = TerminateOnDrop(&self.state);

        let mut decoder = match self.decoders.create(&self.format) {
            Ok(decoder) => decoder,
            Err(e) => {
                error!(track_id = %track_id, error = %e, "Failed to create decoder");
                self.state.send_replace(ConsumerState::Terminated);
                return TerminationReason::DecoderFailed;
            }
        };

        let sink = match self.sinks.open(&self.format, self.buffer.reader()) {
            Ok(sink) => sink,
            Err(e) => {
                error!(track_id = %track_id, error = %e, "Failed to open playback sink");
                self.state.send_replace(ConsumerState::Terminated);
                return TerminationReason::SinkFailed;
            }
        };

        self.state.send_replace(ConsumerState::Streaming);
        info!(track_id = %track_id, sample_rate = self.format.sample_rate, "Remote track streaming");

        let reason = self.stream(&track_id, decoder.as_mut()).await;

        drop(decoder);
        drop(sink);
        self.state.send_replace(ConsumerState::Terminated);

        let stats = self.stats.snapshot();
        info!(
            track_id = %track_id,
            ?reason,
            packets = stats.packets,
            read_errors = stats.read_errors,
            decode_errors = stats.decode_errors,
            bytes_written = stats.bytes_written,
            "Remote track consumer terminated"
        );
        reason
    }

    async fn stream(&self, track_id: &str, decoder: &mut dyn FrameDecoder) -> TerminationReason {
        let mut consecutive_read_errors: u32 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TerminationReason::Cancelled,
                next = self.track.read_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => {
                    consecutive_read_errors = 0;
                    frame
                }
                Ok(None) => return TerminationReason::TrackClosed,
                Err(e) => {
                    self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                    consecutive_read_errors = consecutive_read_errors.saturating_add(1);
                    warn!(track_id = %track_id, error = %e, "Failed to read packet");
                    if self.max_consecutive_read_errors > 0
                        && consecutive_read_errors >= self.max_consecutive_read_errors
                    {
                        error!(
                            track_id = %track_id,
                            consecutive_read_errors,
                            "Too many consecutive read failures, treating track as closed"
                        );
                        return TerminationReason::ReadErrorCeiling;
                    }
                    continue;
                }
            };

            self.stats.packets.fetch_add(1, Ordering::Relaxed);

            if frame.payload.is_empty() {
                self.stats.empty_payloads.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let pcm = match decoder.decode(&frame.payload) {
                Ok(pcm) => pcm,
                Err(e) => {
                    self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        track_id = %track_id,
                        sequence_number = frame.sequence_number,
                        error = %e,
                        "Failed to decode packet"
                    );
                    continue;
                }
            };

            let bytes = pcm16_to_le_bytes(&pcm);
            self.buffer.write(&bytes);
            self.stats.bytes_written.fetch_add(bytes.len() as u64, Ordering::Relaxed);
            debug!(
                track_id = %track_id,
                sequence_number = frame.sequence_number,
                samples = pcm.len(),
                buffered = self.buffer.len(),
                "Decoded packet"
            );
        }
    }
}

struct TerminateOnDrop<'a>(&'a watch::Sender<ConsumerState>);

impl Drop for TerminateOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ConsumerState::Terminated);
    }
}

/// Handle to a spawned consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    track_id: String,
    buffer: Arc<FrameRingBuffer>,
    stats: Arc<StreamStats>,
    state: watch::Receiver<ConsumerState>,
    cancel: CancellationToken,
    join: Option<JoinHandle<TerminationReason>>,
}

impl ConsumerHandle {
    /// Identifier of the consumed track.
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// The ring buffer fed by this consumer.
    pub fn buffer(&self) -> &Arc<FrameRingBuffer> {
        &self.buffer
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current state.
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Watch the consumer's state.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Ask the consumer to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the consumer to finish.
    pub async fn wait(mut self) -> TerminationReason {
        match self.join.take() {
            Some(join) => match join.await {
                Ok(reason) => reason,
                Err(e) if e.is_panic() => {
                    error!(track_id = %self.track_id, error = %e, "Consumer task panicked");
                    TerminationReason::Panicked
                }
                Err(_) => TerminationReason::Cancelled,
            },
            None => TerminationReason::Cancelled,
        }
    }
}

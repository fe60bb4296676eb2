//! In-memory stand-ins for the peer connection, tracks, codec and devices.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use voicewire::{
    AudioFormat, CaptureDevice, CapturedTrack, DecoderFactory, EncodedFrame, FrameDecoder,
    MediaKind, PeerTransport, PlaybackSink, RemoteTrack, Result, RingBufferReader,
    SessionDescription, SinkFactory, TransceiverDirection, VoiceError,
};
use voicewire::transport::TrackHandler;

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ----------------------------------------------------------------------------
// Remote tracks
// ----------------------------------------------------------------------------

pub enum Step {
    Frame(EncodedFrame),
    Error(String),
    Close,
}

/// A remote track whose packets are pushed by the test.
pub struct ScriptedTrack {
    id: String,
    kind: MediaKind,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Step>>,
}

/// Test side of a [`ScriptedTrack`].
#[derive(Clone)]
pub struct TrackScript {
    tx: mpsc::UnboundedSender<Step>,
    seq: Arc<AtomicUsize>,
}

impl TrackScript {
    pub fn packet(&self, payload: &[u8]) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) as u16;
        let _ = self.tx.send(Step::Frame(EncodedFrame::new(payload.to_vec(), seq, seq as u32 * 960)));
    }

    pub fn read_error(&self, message: &str) {
        let _ = self.tx.send(Step::Error(message.to_string()));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Step::Close);
    }
}

impl ScriptedTrack {
    pub fn new(id: &str, kind: MediaKind) -> (Arc<Self>, TrackScript) {
        let (tx, rx) = mpsc::unbounded_channel();
        let track = Arc::new(Self { id: id.to_string(), kind, rx: tokio::sync::Mutex::new(rx) });
        (track, TrackScript { tx, seq: Arc::new(AtomicUsize::new(0)) })
    }

    pub fn audio(id: &str) -> (Arc<Self>, TrackScript) {
        Self::new(id, MediaKind::Audio)
    }
}

#[async_trait]
impl RemoteTrack for ScriptedTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn read_frame(&self) -> Result<Option<EncodedFrame>> {
        match self.rx.lock().await.recv().await {
            Some(Step::Frame(frame)) => Ok(Some(frame)),
            Some(Step::Error(message)) => Err(VoiceError::transport(message)),
            Some(Step::Close) | None => Ok(None),
        }
    }
}

// ----------------------------------------------------------------------------
// Peer transport
// ----------------------------------------------------------------------------

/// Records every call the session makes on the peer connection.
#[derive(Default)]
pub struct MockTransport {
    pub transceivers: Mutex<Vec<(Arc<String>, TransceiverDirection)>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub set_remote_calls: AtomicUsize,
    pub handler: Mutex<Option<TrackHandler<ScriptedTrack>>>,
    pub closed: AtomicBool,
    pub fail_create_offer: AtomicBool,
    pub fail_set_local: AtomicBool,
    pub fail_set_remote: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Announce a remote track as the connection would after negotiation.
    pub fn announce(&self, track: Arc<ScriptedTrack>) {
        let handler = self.handler.lock();
        let handler = handler.as_ref().expect("on_track handler not registered");
        handler(track);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    type LocalTrack = String;
    type RemoteTrack = ScriptedTrack;

    async fn add_transceiver(
        &self,
        track: Arc<String>,
        direction: TransceiverDirection,
    ) -> Result<()> {
        self.transceivers.lock().push((track, direction));
        Ok(())
    }

    async fn transceiver_count(&self) -> usize {
        self.transceivers.lock().len()
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.fail_create_offer.load(Ordering::SeqCst) {
            return Err(VoiceError::transport("offer generation failed"));
        }
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        if self.fail_set_local.load(Ordering::SeqCst) {
            return Err(VoiceError::transport("local description rejected"));
        }
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.set_remote_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_set_remote.load(Ordering::SeqCst) {
            return Err(VoiceError::transport("remote description rejected"));
        }
        *self.remote.lock() = Some(description);
        Ok(())
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    fn on_track(&self, handler: TrackHandler<ScriptedTrack>) {
        *self.handler.lock() = Some(handler);
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Capture device
// ----------------------------------------------------------------------------

struct DeviceGuard(Arc<AtomicBool>);

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A microphone that yields one `String` track.
#[derive(Default)]
pub struct MockCapture {
    pub released: Arc<AtomicBool>,
    pub unavailable: bool,
}

impl CaptureDevice for MockCapture {
    type Track = String;

    fn request_capture_tracks(&self, _format: &AudioFormat) -> Result<Vec<CapturedTrack<String>>> {
        if self.unavailable {
            return Err(VoiceError::device("microphone permission denied"));
        }
        Ok(vec![CapturedTrack::with_resource(
            Arc::new("mic".to_string()),
            DeviceGuard(Arc::clone(&self.released)),
        )])
    }
}

// ----------------------------------------------------------------------------
// Decoder
// ----------------------------------------------------------------------------

/// Payload `[0xFF]` is corrupt; any other payload decodes to one sample per
/// byte, valued `byte * 100`.
pub struct MockDecoder;

impl FrameDecoder for MockDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        if payload == [0xFF] {
            return Err(VoiceError::decode("corrupted packet"));
        }
        if payload == [0xDE, 0xAD] {
            panic!("decoder bug");
        }
        Ok(payload.iter().map(|&b| b as i16 * 100).collect())
    }
}

/// What [`MockDecoder`] produces for `payload`, as little-endian bytes.
pub fn expected_pcm(payload: &[u8]) -> Vec<u8> {
    payload.iter().flat_map(|&b| (b as i16 * 100).to_le_bytes()).collect()
}

#[derive(Default)]
pub struct MockDecoderFactory {
    pub fail: bool,
}

impl DecoderFactory for MockDecoderFactory {
    fn create(&self, _format: &AudioFormat) -> Result<Box<dyn FrameDecoder>> {
        if self.fail {
            return Err(VoiceError::decode("unsupported sample rate"));
        }
        Ok(Box::new(MockDecoder))
    }
}

// ----------------------------------------------------------------------------
// Playback sink
// ----------------------------------------------------------------------------

struct RecordingSink {
    closed: Arc<AtomicUsize>,
}

impl PlaybackSink for RecordingSink {}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps every reader it is handed so tests can inspect the PCM stream.
#[derive(Default)]
pub struct RecordingSinkFactory {
    pub fail: bool,
    pub readers: Mutex<Vec<RingBufferReader>>,
    pub closed: Arc<AtomicUsize>,
}

impl RecordingSinkFactory {
    pub fn opened(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drain everything currently buffered for the `index`th sink.
    pub fn drain(&self, index: usize) -> Vec<u8> {
        let readers = self.readers.lock();
        let buffer = readers[index].buffer();
        let mut out = Vec::new();
        while let Some(chunk) = buffer.try_read(4096) {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

impl SinkFactory for RecordingSinkFactory {
    fn open(&self, _format: &AudioFormat, reader: RingBufferReader) -> Result<Box<dyn PlaybackSink>> {
        if self.fail {
            return Err(VoiceError::device("no output device available"));
        }
        self.readers.lock().push(reader);
        Ok(Box::new(RecordingSink { closed: Arc::clone(&self.closed) }))
    }
}

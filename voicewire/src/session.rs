//! Voice session orchestration.
//!
//! Wires the pieces together in the order the protocol requires:
//!
//! 1. acquire the local capture track,
//! 2. attach it to the peer connection as send/recv,
//! 3. register the inbound-track handler,
//! 4. issue an ephemeral credential,
//! 5. negotiate.
//!
//! Every session owns its consumers, buffers and cancellation token, so
//! several sessions can coexist in one process.
//!
//! # Example
//!
//! ```rust,ignore
//! use voicewire::{SessionConfig, VoiceSessionBuilder};
//!
//! let session = VoiceSessionBuilder::new(SessionConfig::default())
//!     .api_key(api_key)
//!     .decoders(Arc::new(OpusDecoderFactory))
//!     .sinks(Arc::new(CpalSinkFactory::default()))
//!     .connect(transport, &CpalCapture::default())
//!     .await?;
//!
//! tokio::signal::ctrl_c().await?;
//! session.close().await?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::consumer::{
    ConsumerHandle, ConsumerState, DecoderFactory, RemoteTrackConsumer, SinkFactory, StatsSnapshot,
};
use crate::error::{Result, VoiceError};
use crate::negotiator::{Negotiator, ServiceCredentials};
use crate::source::{CaptureDevice, LocalMediaSource};
use crate::transport::{MediaKind, PeerTransport, RemoteTrack};

/// Status of one remote-track consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerStatus {
    /// Identifier of the consumed track.
    pub track_id: String,
    /// Lifecycle state.
    pub state: ConsumerState,
    /// Packet counters.
    pub stats: StatsSnapshot,
}

/// Builder for [`VoiceSession`].
pub struct VoiceSessionBuilder {
    config: SessionConfig,
    api_key: Option<SecretString>,
    http: Option<reqwest::Client>,
    decoders: Option<Arc<dyn DecoderFactory>>,
    sinks: Option<Arc<dyn SinkFactory>>,
}

impl VoiceSessionBuilder {
    /// Start building a session from `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self { config, api_key: None, http: None, decoders: None, sinks: None }
    }

    /// Set the long-lived API key used to request the session credential.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Set the API key from an already-wrapped secret.
    pub fn api_key_secret(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Share an HTTP client for signaling.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Set the decoder factory for remote tracks.
    pub fn decoders(mut self, decoders: Arc<dyn DecoderFactory>) -> Self {
        self.decoders = Some(decoders);
        self
    }

    /// Set the playback sink factory for remote tracks.
    pub fn sinks(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Establish the session on `transport`, capturing from `capture`.
    ///
    /// On any failure the transport is closed and must not be reused.
    pub async fn connect<P, D>(self, transport: Arc<P>, capture: &D) -> Result<VoiceSession<P>>
    where
        P: PeerTransport + 'static,
        D: CaptureDevice<Track = P::LocalTrack> + ?Sized,
    {
        let result = self.establish(Arc::clone(&transport), capture).await;
        if let Err(e) = &result {
            error!(error = %e, "Session establishment failed");
            if let Err(close_err) = transport.close().await {
                warn!(error = %close_err, "Failed to close transport after establishment failure");
            }
        }
        result
    }

    async fn establish<P, D>(self, transport: Arc<P>, capture: &D) -> Result<VoiceSession<P>>
    where
        P: PeerTransport + 'static,
        D: CaptureDevice<Track = P::LocalTrack> + ?Sized,
    {
        self.config.validate()?;
        let api_key = self.api_key.ok_or_else(|| VoiceError::config("API key is required"))?;
        let decoders =
            self.decoders.ok_or_else(|| VoiceError::config("decoder factory is required"))?;
        let sinks = self.sinks.ok_or_else(|| VoiceError::config("sink factory is required"))?;

        let negotiator = match self.http {
            Some(http) => Negotiator::with_client(http, self.config.clone()),
            None => Negotiator::new(self.config.clone())?,
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let consumers: Arc<Mutex<Vec<ConsumerHandle>>> = Arc::new(Mutex::new(Vec::new()));

        let source = LocalMediaSource::acquire(capture, self.config.audio_format)?;
        source.attach(transport.as_ref()).await?;

        transport.on_track(track_handler::<P::RemoteTrack>(TrackContext {
            session_id: session_id.clone(),
            config: self.config.clone(),
            decoders,
            sinks,
            cancel: cancel.clone(),
            consumers: Arc::clone(&consumers),
        }));

        let service = ServiceCredentials::from_config(api_key, &self.config);
        let credential = negotiator.issue_credential(&service).await?;
        negotiator.negotiate(transport.as_ref(), &credential).await?;

        info!(session_id = %session_id, model = %self.config.model, "Voice session established");

        Ok(VoiceSession { session_id, transport, source, consumers, cancel })
    }
}

struct TrackContext {
    session_id: String,
    config: SessionConfig,
    decoders: Arc<dyn DecoderFactory>,
    sinks: Arc<dyn SinkFactory>,
    cancel: CancellationToken,
    consumers: Arc<Mutex<Vec<ConsumerHandle>>>,
}

fn track_handler<R>(ctx: TrackContext) -> Box<dyn Fn(Arc<R>) + Send + Sync>
where
    R: RemoteTrack + 'static,
{
    Box::new(move |track: Arc<R>| {
        let track_id = track.id();
        if track.kind() != MediaKind::Audio {
            info!(session_id = %ctx.session_id, track_id = %track_id, kind = %track.kind(), "Ignoring non-audio track");
            return;
        }
        if ctx.cancel.is_cancelled() {
            warn!(session_id = %ctx.session_id, track_id = %track_id, "Track announced after session close");
            return;
        }

        info!(session_id = %ctx.session_id, track_id = %track_id, "Remote audio track announced");
        let handle = RemoteTrackConsumer::new(
            track,
            ctx.config.audio_format,
            Arc::clone(&ctx.decoders),
            Arc::clone(&ctx.sinks),
        )
        .with_cancellation(ctx.cancel.child_token())
        .with_max_consecutive_read_errors(ctx.config.max_consecutive_read_errors)
        .spawn();
        ctx.consumers.lock().push(handle);
    })
}

/// An established voice session.
pub struct VoiceSession<P: PeerTransport> {
    session_id: String,
    transport: Arc<P>,
    source: LocalMediaSource<P::LocalTrack>,
    consumers: Arc<Mutex<Vec<ConsumerHandle>>>,
    cancel: CancellationToken,
}

impl<P: PeerTransport + 'static> VoiceSession<P> {
    /// Unique session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The underlying peer connection.
    pub fn transport(&self) -> &Arc<P> {
        &self.transport
    }

    /// The local capture source.
    pub fn source(&self) -> &LocalMediaSource<P::LocalTrack> {
        &self.source
    }

    /// Status of every consumer spawned so far.
    pub fn consumers(&self) -> Vec<ConsumerStatus> {
        self.consumers
            .lock()
            .iter()
            .map(|c| ConsumerStatus {
                track_id: c.track_id().to_string(),
                state: c.state(),
                stats: c.stats(),
            })
            .collect()
    }

    /// Wait until every consumer spawned so far has terminated.
    pub async fn wait(&self) {
        let receivers: Vec<_> = self.consumers.lock().iter().map(|c| c.subscribe()).collect();
        for mut rx in receivers {
            let _ = rx.wait_for(|state| *state == ConsumerState::Terminated).await;
        }
    }

    /// Token cancelled when the session closes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every consumer, close the peer connection and release the capture device.
    pub async fn close(self) -> Result<()> {
        info!(session_id = %self.session_id, "Closing voice session");
        self.cancel.cancel();

        let handles: Vec<ConsumerHandle> = std::mem::take(&mut *self.consumers.lock());
        for handle in handles {
            let track_id = handle.track_id().to_string();
            let reason = handle.wait().await;
            info!(session_id = %self.session_id, track_id = %track_id, ?reason, "Consumer stopped");
        }

        let result = self.transport.close().await;
        self.source.release();
        result
    }
}

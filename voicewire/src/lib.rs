//! # voicewire
//!
//! Real-time bidirectional voice sessions with the OpenAI Realtime API over WebRTC.
//!
//! The local microphone is sent to the model as an Opus track, and the model's
//! spoken responses come back on a remote track that is decoded and played.
//!
//! ## Architecture
//!
//! ```text
//!   microphone ──▶ LocalMediaSource ──▶ PeerTransport ◀──▶ OpenAI Realtime
//!                                           │
//!                                   on_track│
//!                                           ▼
//!                               RemoteTrackConsumer ──▶ FrameRingBuffer ──▶ speaker
//! ```
//!
//! Session establishment is driven by the [`Negotiator`]: it exchanges the API
//! key for a short-lived credential, then trades the local SDP offer for the
//! service's answer.
//!
//! ## Features
//!
//! - `opus`: Opus encode/decode via libopus
//! - `webrtc`: the webrtc-rs peer connection backend
//! - `desktop-audio`: cpal microphone capture and speaker playback
//!
//! With no features enabled the crate exposes the protocol core only; plug in
//! your own [`PeerTransport`], [`CaptureDevice`], [`DecoderFactory`] and
//! [`SinkFactory`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voicewire::{SessionConfig, VoiceSessionBuilder};
//! use voicewire::codec::OpusDecoderFactory;
//! use voicewire::device::{CpalCapture, CpalSinkFactory};
//! use voicewire::rtc::WebRtcTransport;
//!
//! let config = SessionConfig::default();
//! let transport = Arc::new(WebRtcTransport::new(&config).await?);
//!
//! let session = VoiceSessionBuilder::new(config)
//!     .api_key(std::env::var("OPENAI_API_KEY")?)
//!     .decoders(Arc::new(OpusDecoderFactory))
//!     .sinks(Arc::new(CpalSinkFactory::new()))
//!     .connect(transport, &CpalCapture::new())
//!     .await?;
//!
//! tokio::signal::ctrl_c().await?;
//! session.close().await?;
//! ```

pub mod audio;
pub mod buffer;
pub mod config;
pub mod consumer;
pub mod error;
pub mod negotiator;
pub mod session;
pub mod source;
pub mod transport;

#[cfg(feature = "opus")]
pub mod codec;

#[cfg(feature = "webrtc")]
pub mod rtc;

#[cfg(feature = "desktop-audio")]
pub mod device;

// Re-exports
pub use audio::AudioFormat;
pub use buffer::{FrameRingBuffer, RingBufferReader};
pub use config::SessionConfig;
pub use consumer::{
    ConsumerHandle, ConsumerState, DecoderFactory, FrameDecoder, PlaybackSink,
    RemoteTrackConsumer, SinkFactory, StatsSnapshot, TerminationReason,
};
pub use error::{NegotiationStep, Result, VoiceError};
pub use negotiator::{Credential, Negotiator, ServiceCredentials};
pub use session::{ConsumerStatus, VoiceSession, VoiceSessionBuilder};
pub use source::{CaptureDevice, CapturedTrack, LocalMediaSource};
pub use transport::{
    EncodedFrame, MediaKind, PeerTransport, RemoteTrack, SdpType, SessionDescription,
    TransceiverDirection,
};

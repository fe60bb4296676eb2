//! Error types for voice sessions.

use thiserror::Error;

/// Result type for voicewire operations.
pub type Result<T> = std::result::Result<T, VoiceError>;

/// The step of the offer/answer exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    /// Creating the local SDP offer.
    CreateOffer,
    /// Committing the offer as the local description.
    SetLocalDescription,
    /// Posting the offer to the remote endpoint and reading the answer.
    Exchange,
    /// Applying the returned answer as the remote description.
    SetRemoteDescription,
}

impl std::fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateOffer => write!(f, "create offer"),
            Self::SetLocalDescription => write!(f, "set local description"),
            Self::Exchange => write!(f, "SDP exchange"),
            Self::SetRemoteDescription => write!(f, "set remote description"),
        }
    }
}

/// Errors that can occur while establishing or running a voice session.
#[derive(Error, Debug)]
pub enum VoiceError {
    /// The credential issuance endpoint rejected the request.
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Network-level failure reaching an HTTP endpoint or the media transport.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A response body could not be interpreted.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// A step of the offer/answer exchange failed.
    #[error("Negotiation failed during {step}: {source}")]
    NegotiationError {
        /// The failing step.
        step: NegotiationStep,
        /// The underlying failure.
        #[source]
        source: Box<VoiceError>,
    },

    /// Capture or playback device unavailable, or format mismatch.
    #[error("Device error: {0}")]
    DeviceError(String),

    /// A single packet failed to decode.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl VoiceError {
    /// Create a new authentication error.
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::AuthError(msg.into())
    }

    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::ProtocolError(msg.into())
    }

    /// Create a new device error.
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceError(msg.into())
    }

    /// Create a new decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::DecodeError(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Wrap a failure as a negotiation error at the given step.
    pub fn negotiation(step: NegotiationStep, source: VoiceError) -> Self {
        Self::NegotiationError { step, source: Box::new(source) }
    }

    /// Returns the failing step if this is a negotiation error.
    pub fn negotiation_step(&self) -> Option<NegotiationStep> {
        match self {
            Self::NegotiationError { step, .. } => Some(*step),
            _ => None,
        }
    }
}

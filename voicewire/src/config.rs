//! Configuration for voice sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::error::{Result, VoiceError};

/// OpenAI REST base URL.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default realtime model.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Default voice.
pub const DEFAULT_VOICE: &str = "verse";

/// Default STUN server.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

/// Default ceiling on back-to-back packet read failures before a track is
/// considered closed.
pub const DEFAULT_MAX_CONSECUTIVE_READ_ERRORS: u32 = 1000;

/// Available voices for OpenAI Realtime.
pub const OPENAI_VOICES: &[&str] =
    &["alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse"];

/// Configuration for one voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// REST base URL; both signaling endpoints hang off it.
    pub api_base: String,

    /// Realtime model requested at credential issuance and SDP exchange.
    pub model: String,

    /// Voice requested at credential issuance.
    pub voice: String,

    /// STUN/TURN URLs handed to the peer connection.
    pub ice_servers: Vec<String>,

    /// Capture and playback format.
    pub audio_format: AudioFormat,

    /// Back-to-back read failures tolerated before a track counts as closed.
    /// `0` disables the ceiling.
    pub max_consecutive_read_errors: u32,

    /// Optional deadline for each signaling HTTP request. `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_ms")]
    pub http_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
            audio_format: AudioFormat::default(),
            max_consecutive_read_errors: DEFAULT_MAX_CONSECUTIVE_READ_ERRORS,
            http_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the REST base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Replace the ICE server list.
    pub fn with_ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Set the capture/playback format.
    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self
    }

    /// Set the read-error ceiling.
    pub fn with_max_consecutive_read_errors(mut self, max: u32) -> Self {
        self.max_consecutive_read_errors = max;
        self
    }

    /// Set a deadline for signaling requests.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// URL of the ephemeral credential endpoint.
    pub fn sessions_url(&self) -> String {
        format!("{}/realtime/sessions", self.api_base.trim_end_matches('/'))
    }

    /// URL of the SDP exchange endpoint. The model goes in the `model` query parameter.
    pub fn exchange_url(&self) -> String {
        format!("{}/realtime", self.api_base.trim_end_matches('/'))
    }

    /// Check the configuration for obvious mistakes.
    pub fn validate(&self) -> Result<()> {
        if self.api_base.is_empty() {
            return Err(VoiceError::config("api_base must not be empty"));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(VoiceError::config(format!(
                "api_base must be an http(s) URL, got {}",
                self.api_base
            )));
        }
        if self.model.trim().is_empty() {
            return Err(VoiceError::config("model must not be empty"));
        }
        if self.voice.trim().is_empty() {
            return Err(VoiceError::config("voice must not be empty"));
        }
        // A format the device contract cannot honour stays a DeviceError.
        self.audio_format.validate()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_u64(d.as_millis() as u64),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

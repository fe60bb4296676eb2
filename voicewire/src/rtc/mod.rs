//! webrtc-rs backend.
//!
//! - [`WebRtcTransport`] implements [`PeerTransport`](crate::transport::PeerTransport)
//!   over an `RTCPeerConnection`.
//! - [`WebRtcRemoteTrack`] adapts inbound `TrackRemote`s to
//!   [`RemoteTrack`](crate::transport::RemoteTrack).
//! - [`LocalAudioWriter`] encodes captured PCM frames to Opus and writes them
//!   to the outbound track.

mod peer;
mod track;
mod writer;

pub use peer::WebRtcTransport;
pub use track::WebRtcRemoteTrack;
pub use writer::LocalAudioWriter;

use std::sync::Arc;

use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::audio::AudioFormat;

/// Opus mime type as registered in the media engine.
pub const MIME_TYPE_OPUS: &str = "audio/opus";

/// RTP codec capability for Opus in `format`.
pub fn opus_capability(format: &AudioFormat) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: format.sample_rate,
        channels: format.channels as u16,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
        rtcp_feedback: vec![],
    }
}

/// Create the outbound microphone track.
pub fn new_local_audio_track(format: &AudioFormat) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        opus_capability(format),
        "audio".to_owned(),
        "voicewire".to_owned(),
    ))
}

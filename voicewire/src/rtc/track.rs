use std::sync::Arc;

use async_trait::async_trait;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Result, VoiceError};
use crate::transport::{EncodedFrame, MediaKind, RemoteTrack};

/// Inbound webrtc-rs track.
pub struct WebRtcRemoteTrack {
    track: Arc<TrackRemote>,
}

impl WebRtcRemoteTrack {
    /// Wrap a webrtc-rs remote track.
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }

    /// Negotiated codec mime type.
    pub fn mime_type(&self) -> String {
        self.track.codec().capability.mime_type
    }
}

/// webrtc-rs reports a torn-down track only through the error text.
fn is_closed_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("eof") || message.contains("closed")
}

#[async_trait]
impl RemoteTrack for WebRtcRemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> MediaKind {
        match self.track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    async fn read_frame(&self) -> Result<Option<EncodedFrame>> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => Ok(Some(EncodedFrame::new(
                packet.payload,
                packet.header.sequence_number,
                packet.header.timestamp,
            ))),
            Err(e) => {
                let message = e.to_string();
                if is_closed_error(&message) {
                    Ok(None)
                } else {
                    Err(VoiceError::transport(format!("RTP read failed: {message}")))
                }
            }
        }
    }
}

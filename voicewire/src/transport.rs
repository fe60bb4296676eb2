//! Capability surface of the peer connection.
//!
//! The negotiator, the local media source and the remote-track consumer only
//! ever talk to the peer connection through these traits. The `webrtc`
//! feature provides the webrtc-rs implementation; tests provide in-memory ones.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Local capabilities proposed to the remote side.
    Offer,
    /// The remote side's response to an offer.
    Answer,
}

/// An SDP blob plus its role in the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: SdpType,
    /// Raw SDP text.
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpType::Offer, sdp: sdp.into() }
    }

    /// Create an answer description.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpType::Answer, sdp: sdp.into() }
    }
}

/// Send/receive direction of a transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverDirection {
    /// Send the local track and receive the remote one.
    SendRecv,
    /// Send only.
    SendOnly,
    /// Receive only.
    RecvOnly,
}

/// Media kind of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// One network-delivered unit of compressed audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Codec payload (RTP payload, header stripped).
    pub payload: Bytes,
    /// RTP sequence number.
    pub sequence_number: u16,
    /// RTP timestamp in codec clock units.
    pub timestamp: u32,
}

impl EncodedFrame {
    /// Create a new encoded frame.
    pub fn new(payload: impl Into<Bytes>, sequence_number: u16, timestamp: u32) -> Self {
        Self { payload: payload.into(), sequence_number, timestamp }
    }
}

/// A receive-side track announced by the peer connection.
#[async_trait]
pub trait RemoteTrack: Send + Sync {
    /// Track identifier as announced in the remote SDP.
    fn id(&self) -> String;

    /// Media kind of this track.
    fn kind(&self) -> MediaKind;

    /// Pull the next packet, waiting as long as the network takes.
    ///
    /// - `Ok(Some(frame))`: a packet arrived.
    /// - `Ok(None)`: the track is permanently closed.
    /// - `Err(_)`: this read failed; later reads may succeed.
    async fn read_frame(&self) -> Result<Option<EncodedFrame>>;
}

/// Callback invoked once per remote track announced by the peer connection.
pub type TrackHandler<R> = Box<dyn Fn(Arc<R>) + Send + Sync>;

/// A peer connection exposed as the operations a voice session needs.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Outbound track type accepted by [`add_transceiver`](Self::add_transceiver).
    type LocalTrack: Send + Sync + 'static;

    /// Inbound track type handed to the [`on_track`](Self::on_track) handler.
    type RemoteTrack: RemoteTrack + 'static;

    /// Attach a local track as a transceiver with the given direction.
    async fn add_transceiver(
        &self,
        track: Arc<Self::LocalTrack>,
        direction: TransceiverDirection,
    ) -> Result<()>;

    /// Number of transceivers attached so far.
    async fn transceiver_count(&self) -> usize;

    /// Create an offer describing the currently attached tracks.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Commit a description as the local one.
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// The committed local description, once it is ready to be sent.
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Apply the remote side's description.
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// The applied remote description, if any.
    async fn remote_description(&self) -> Option<SessionDescription>;

    /// Register the handler invoked for every inbound track.
    fn on_track(&self, handler: TrackHandler<Self::RemoteTrack>);

    /// Tear down the connection.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_description_serializes_type_field() {
        let answer = SessionDescription::answer("v=0\r\n");
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0\r\n");
    }

    #[test]
    fn test_encoded_frame_from_vec() {
        let frame = EncodedFrame::new(vec![1u8, 2, 3], 7, 960);
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
        assert_eq!(frame.sequence_number, 7);
        assert_eq!(frame.timestamp, 960);
    }
}

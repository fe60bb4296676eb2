use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::track::WebRtcRemoteTrack;
use crate::config::SessionConfig;
use crate::error::{Result, VoiceError};
use crate::transport::{
    PeerTransport, SdpType, SessionDescription, TrackHandler, TransceiverDirection,
};

/// Peer connection backed by webrtc-rs.
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    gather_complete: Mutex<Option<mpsc::Receiver<()>>>,
}

impl WebRtcTransport {
    /// Create a peer connection using the ICE servers in `config`.
    pub async fn new(config: &SessionConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| VoiceError::transport(format!("Failed to register codecs: {e}")))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| VoiceError::transport(format!("Failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|url| RTCIceServer { urls: vec![url.clone()], ..Default::default() })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            VoiceError::transport(format!("Failed to create peer connection: {e}"))
        })?);

        pc.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            match state {
                RTCPeerConnectionState::Failed => warn!(?state, "Peer connection failed"),
                _ => info!(?state, "Peer connection state changed"),
            }
            Box::pin(async {})
        }));

        debug!(ice_servers = config.ice_servers.len(), "Created peer connection");
        Ok(Self { pc, gather_complete: Mutex::new(None) })
    }

    /// The underlying webrtc-rs peer connection.
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

fn to_description(desc: RTCSessionDescription) -> SessionDescription {
    match desc.sdp_type {
        RTCSdpType::Offer => SessionDescription::offer(desc.sdp),
        _ => SessionDescription::answer(desc.sdp),
    }
}

fn from_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    converted.map_err(|e| VoiceError::protocol(format!("Invalid session description: {e}")))
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    type LocalTrack = TrackLocalStaticSample;
    type RemoteTrack = WebRtcRemoteTrack;

    async fn add_transceiver(
        &self,
        track: Arc<TrackLocalStaticSample>,
        direction: TransceiverDirection,
    ) -> Result<()> {
        let direction = match direction {
            TransceiverDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
            TransceiverDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            TransceiverDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
        };

        self.pc
            .add_transceiver_from_track(
                track as Arc<dyn TrackLocal + Send + Sync>,
                Some(RTCRtpTransceiverInit { direction, send_encodings: vec![] }),
            )
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to add transceiver: {e}")))?;
        Ok(())
    }

    async fn transceiver_count(&self) -> usize {
        self.pc.get_transceivers().await.len()
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to create offer: {e}")))?;
        Ok(to_description(offer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = from_description(description)?;
        // Subscribe before committing so the completion signal is not missed.
        let gather = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to set local description: {e}")))?;
        *self.gather_complete.lock().await = Some(gather);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        if let Some(mut gather) = self.gather_complete.lock().await.take() {
            let _ = gather.recv().await;
            debug!("ICE gathering complete");
        }
        self.pc.local_description().await.map(to_description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = from_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to set remote description: {e}")))
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        self.pc.remote_description().await.map(to_description)
    }

    fn on_track(&self, handler: TrackHandler<WebRtcRemoteTrack>) {
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            handler(Arc::new(WebRtcRemoteTrack::new(track)));
            Box::pin(async {})
        }));
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to close peer connection: {e}")))
    }
}

//! Local media source: the outbound capture track.
//!
//! Acquisition validates the format contract (mono, 16-bit, an Opus rate),
//! asks the capture device for tracks and keeps whatever hardware handle the
//! device returns alive until the source is dropped.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::AudioFormat;
use crate::error::{Result, VoiceError};
use crate::transport::{PeerTransport, TransceiverDirection};

/// A captured track plus the device resource backing it.
pub struct CapturedTrack<T> {
    track: Arc<T>,
    resource: Option<Box<dyn Any + Send + Sync>>,
}

impl<T> CapturedTrack<T> {
    /// A track with no device resource attached.
    pub fn new(track: Arc<T>) -> Self {
        Self { track, resource: None }
    }

    /// A track whose device is released when `resource` is dropped.
    pub fn with_resource(track: Arc<T>, resource: impl Any + Send + Sync) -> Self {
        Self { track, resource: Some(Box::new(resource)) }
    }

    /// The track itself.
    pub fn track(&self) -> &Arc<T> {
        &self.track
    }

    /// Whether a device resource is held.
    pub fn holds_resource(&self) -> bool {
        self.resource.is_some()
    }
}

impl<T> std::fmt::Debug for CapturedTrack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedTrack").field("holds_resource", &self.holds_resource()).finish()
    }
}

/// A device that can produce capture tracks.
pub trait CaptureDevice: Send + Sync {
    /// Track type produced by this device.
    type Track: Send + Sync + 'static;

    /// Open the device for `format` and return its tracks.
    fn request_capture_tracks(&self, format: &AudioFormat) -> Result<Vec<CapturedTrack<Self::Track>>>;
}

/// Holds the acquired capture tracks for the lifetime of a session.
#[derive(Debug)]
pub struct LocalMediaSource<T> {
    tracks: Vec<CapturedTrack<T>>,
    format: AudioFormat,
}

impl<T: Send + Sync + 'static> LocalMediaSource<T> {
    /// Acquire capture tracks from `device` in `format`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the format is outside the contract, the device
    /// fails, or it yields no track.
    pub fn acquire<D>(device: &D, format: AudioFormat) -> Result<Self>
    where
        D: CaptureDevice<Track = T> + ?Sized,
    {
        format.validate()?;

        let tracks = device.request_capture_tracks(&format)?;
        if tracks.is_empty() {
            return Err(VoiceError::device("capture device returned no audio track"));
        }

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            tracks = tracks.len(),
            "Acquired capture track"
        );
        Ok(Self { tracks, format })
    }

    /// The primary capture track.
    pub fn track(&self) -> &Arc<T> {
        // acquire() guarantees at least one track
        self.tracks[0].track()
    }

    /// Number of acquired tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// The format the tracks were acquired in.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Attach the primary track to `transport` as a send/receive transceiver.
    ///
    /// Must happen before negotiation so the offer advertises the track.
    pub async fn attach<P>(&self, transport: &P) -> Result<()>
    where
        P: PeerTransport<LocalTrack = T> + ?Sized,
    {
        transport.add_transceiver(Arc::clone(self.track()), TransceiverDirection::SendRecv).await?;
        debug!("Attached capture track as sendrecv transceiver");
        Ok(())
    }

    /// Release the device now instead of at drop.
    pub fn release(self) {
        info!(tracks = self.tracks.len(), "Releasing capture device");
        drop(self);
    }
}

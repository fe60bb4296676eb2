//! Desktop audio I/O via cpal.
//!
//! cpal streams are not `Send`, so each one lives on a dedicated thread for
//! its whole life. The handle returned to the session stops that thread on
//! drop, which is what releases the device. Inside a Tokio runtime the join is
//! handed to the blocking pool; opening a device still blocks the caller until
//! the stream is playing.

mod capture;
mod playback;

pub use capture::CpalCapture;
pub use playback::{CpalSink, CpalSinkFactory};

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, warn};

use crate::audio::AudioFormat;
use crate::error::{Result, VoiceError};

/// Stream configuration for `format`, letting the driver pick the period.
fn stream_config(format: &AudioFormat) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels as u16,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Find an input device by name, or the default one.
fn input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| VoiceError::device(format!("Failed to enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| VoiceError::device(format!("Input device not found: {name}"))),
        None => host
            .default_input_device()
            .ok_or_else(|| VoiceError::device("No input device available")),
    }
}

/// Find an output device by name, or the default one.
fn output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| VoiceError::device(format!("Failed to enumerate output devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| VoiceError::device(format!("Output device not found: {name}"))),
        None => host
            .default_output_device()
            .ok_or_else(|| VoiceError::device("No output device available")),
    }
}

/// List input device names on the default host.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    Ok(host
        .input_devices()
        .map_err(|e| VoiceError::device(format!("Failed to enumerate input devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect())
}

/// List output device names on the default host.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    Ok(host
        .output_devices()
        .map_err(|e| VoiceError::device(format!("Failed to enumerate output devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect())
}

/// Owns a playing cpal stream on its own thread.
pub(crate) struct StreamThread {
    stop: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
    name: String,
}

impl StreamThread {
    /// Build and start a stream on a new thread, waiting until it plays.
    pub(crate) fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(VoiceError::device(format!(
                        "Failed to start stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Blocks until the owner drops the sender.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::device(format!("Failed to spawn {name} thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!(thread = name, "Audio stream started");
                Ok(Self { stop: Some(stop_tx), join: Some(join), name: name.to_string() })
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => Err(VoiceError::device(format!("{name} thread exited before starting"))),
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            join_worker(&self.name, join);
        }
    }
}

/// Join an audio worker thread without stalling an async worker.
///
/// On a runtime thread the join runs on the blocking pool; elsewhere it
/// happens inline.
pub(crate) fn join_worker(name: &str, join: JoinHandle<()>) {
    let name = name.to_string();
    let finish = move || {
        if join.join().is_err() {
            warn!(thread = %name, "Audio worker thread panicked");
        } else {
            debug!(thread = %name, "Audio worker stopped");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(finish);
        }
        Err(_) => finish(),
    }
}

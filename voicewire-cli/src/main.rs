mod cli;
mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use voicewire::VoiceSessionBuilder;
use voicewire::codec::OpusDecoderFactory;
use voicewire::device::{CpalCapture, CpalSinkFactory, list_input_devices, list_output_devices};
use voicewire::rtc::WebRtcTransport;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init_telemetry("voicewire");

    if cli.list_devices {
        println!("Input devices:");
        for name in list_input_devices()? {
            println!("  {name}");
        }
        println!("Output devices:");
        for name in list_output_devices()? {
            println!("  {name}");
        }
        return Ok(());
    }

    let api_key = config::api_key_from_env()?;
    let session_config = config::session_config(&cli)?;

    let mut capture = CpalCapture::new();
    if let Some(name) = &cli.input_device {
        capture = capture.with_device(name);
    }
    let mut sinks = CpalSinkFactory::new();
    if let Some(name) = &cli.output_device {
        sinks = sinks.with_device(name);
    }

    let transport = Arc::new(
        WebRtcTransport::new(&session_config).await.context("failed to create peer connection")?,
    );

    let session = VoiceSessionBuilder::new(session_config)
        .api_key_secret(api_key)
        .decoders(Arc::new(OpusDecoderFactory))
        .sinks(Arc::new(sinks))
        .connect(transport, &capture)
        .await
        .context("failed to establish voice session")?;

    println!("Connected (session {}). Speak now; press Ctrl-C to quit.", session.session_id());

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutting down");

    for status in session.consumers() {
        info!(
            track_id = %status.track_id,
            state = ?status.state,
            packets = status.stats.packets,
            decode_errors = status.stats.decode_errors,
            "Track summary"
        );
    }

    if let Err(e) = session.close().await {
        warn!(error = %e, "Error while closing session");
    }
    Ok(())
}

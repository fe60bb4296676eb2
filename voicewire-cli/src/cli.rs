use clap::Parser;
use voicewire::config::{
    DEFAULT_API_BASE, DEFAULT_ICE_SERVER, DEFAULT_MAX_CONSECUTIVE_READ_ERRORS, DEFAULT_MODEL,
    DEFAULT_VOICE,
};

#[derive(Parser, Debug)]
#[command(name = "voicewire")]
#[command(about = "Live voice conversation with the OpenAI Realtime API", long_about = None)]
pub struct Cli {
    /// Realtime model
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Voice used by the model
    #[arg(long, default_value = DEFAULT_VOICE)]
    pub voice: String,

    /// REST base URL for the signaling endpoints
    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// STUN/TURN server URL (repeatable)
    #[arg(long = "ice-server", default_value = DEFAULT_ICE_SERVER)]
    pub ice_servers: Vec<String>,

    /// Back-to-back packet read failures before a track counts as closed (0 = never)
    #[arg(long, default_value_t = DEFAULT_MAX_CONSECUTIVE_READ_ERRORS)]
    pub max_read_errors: u32,

    /// Deadline in seconds for each signaling request
    #[arg(long)]
    pub http_timeout_secs: Option<u64>,

    /// Input device name (default device if omitted)
    #[arg(long)]
    pub input_device: Option<String>,

    /// Output device name (default device if omitted)
    #[arg(long)]
    pub output_device: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

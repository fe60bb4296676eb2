use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use voicewire::SessionConfig;

use crate::cli::Cli;

/// Environment variable holding the long-lived API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Read the API key from the environment.
pub fn api_key_from_env() -> Result<SecretString> {
    let key = std::env::var(API_KEY_ENV)
        .with_context(|| format!("{API_KEY_ENV} environment variable not set"))?;
    if key.trim().is_empty() {
        anyhow::bail!("{API_KEY_ENV} is empty");
    }
    Ok(SecretString::from(key))
}

/// Build and validate the session configuration from command-line flags.
pub fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig::new()
        .with_api_base(&cli.api_base)
        .with_model(&cli.model)
        .with_voice(&cli.voice)
        .with_ice_servers(cli.ice_servers.clone())
        .with_max_consecutive_read_errors(cli.max_read_errors);
    if let Some(secs) = cli.http_timeout_secs {
        config = config.with_http_timeout(Duration::from_secs(secs));
    }
    config.validate().context("invalid session configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flags_flow_into_config() {
        let cli = Cli::try_parse_from([
            "voicewire",
            "--model",
            "gpt-realtime",
            "--voice",
            "alloy",
            "--max-read-errors",
            "0",
            "--http-timeout-secs",
            "15",
        ])
        .unwrap();

        let config = session_config(&cli).unwrap();
        assert_eq!(config.model, "gpt-realtime");
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.max_consecutive_read_errors, 0);
        assert_eq!(config.http_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_invalid_api_base_is_reported() {
        let cli = Cli::try_parse_from(["voicewire", "--api-base", "not-a-url"]).unwrap();
        let err = session_config(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("api_base"));
    }
}

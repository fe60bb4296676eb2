//! Credential issuance and SDP offer/answer exchange.
//!
//! Establishing a session takes two HTTP calls against the realtime API:
//!
//! 1. `POST /realtime/sessions` with the long-lived API key returns a
//!    short-lived client secret scoped to one session.
//! 2. `POST /realtime?model=...` with that secret and the local SDP offer
//!    returns the SDP answer.
//!
//! Neither call is retried here. A failed negotiation leaves the transport
//! unusable; the caller discards it and builds a new one.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{NegotiationStep, Result, VoiceError};
use crate::transport::{PeerTransport, SessionDescription};

/// Long-lived service credentials plus the session shape they request.
#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    api_key: SecretString,
    /// Model requested for the session.
    pub model: String,
    /// Voice requested for the session.
    pub voice: String,
}

impl ServiceCredentials {
    /// Create service credentials for a model and voice.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self { api_key: SecretString::from(api_key.into()), model: model.into(), voice: voice.into() }
    }

    /// Take model and voice from a session configuration.
    pub fn from_config(api_key: SecretString, config: &SessionConfig) -> Self {
        Self { api_key, model: config.model.clone(), voice: config.voice.clone() }
    }
}

/// Short-lived bearer token scoped to one session. Never persisted.
#[derive(Debug, Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// The raw token, for building the bearer header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Response from the ephemeral credential endpoint.
#[derive(Debug, Deserialize)]
struct EphemeralTokenResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// JSON form of the SDP exchange response, returned by some deployments
/// instead of `application/sdp`.
#[derive(Debug, Deserialize)]
struct SdpExchangeResponse {
    sdp: String,
}

/// Performs credential issuance and the offer/answer exchange.
#[derive(Debug, Clone)]
pub struct Negotiator {
    http: reqwest::Client,
    config: SessionConfig,
}

impl Negotiator {
    /// Create a negotiator with its own HTTP client.
    ///
    /// Applies `config.http_timeout` to every request when set.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.http_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| VoiceError::transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Create a negotiator sharing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, config: SessionConfig) -> Self {
        Self { http, config }
    }

    /// The configuration this negotiator signals with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Request a short-lived credential for one session.
    ///
    /// # Errors
    ///
    /// - `AuthError` if the endpoint answers with a non-2xx status.
    /// - `ProtocolError` if the body is not the expected JSON or carries an empty secret.
    /// - `TransportError` if the request cannot be sent or a successful body cannot be read.
    pub async fn issue_credential(&self, service: &ServiceCredentials) -> Result<Credential> {
        let url = self.config.sessions_url();
        debug!(model = %service.model, voice = %service.voice, "Requesting ephemeral credential");

        let response = self
            .http
            .post(&url)
            .bearer_auth(service.api_key.expose_secret())
            .json(&serde_json::json!({
                "model": service.model,
                "voice": service.voice,
            }))
            .send()
            .await
            .map_err(|e| VoiceError::transport(format!("Credential request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::auth(format!(
                "Credential request failed with status {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to read credential response: {e}")))?;

        let parsed: EphemeralTokenResponse = serde_json::from_str(&body).map_err(|e| {
            VoiceError::protocol(format!("Failed to parse credential response: {e}"))
        })?;

        if parsed.client_secret.value.is_empty() {
            return Err(VoiceError::protocol("Credential response carried an empty client secret"));
        }

        debug!("Obtained ephemeral credential");
        Ok(Credential::new(parsed.client_secret.value))
    }

    /// Run the offer/answer exchange on `transport`.
    ///
    /// Local tracks must already be attached: the offer's capabilities are
    /// derived from them. The remote description is applied at most once and
    /// only after a successful exchange.
    pub async fn negotiate<T>(&self, transport: &T, credential: &Credential) -> Result<()>
    where
        T: PeerTransport + ?Sized,
    {
        if transport.transceiver_count().await == 0 {
            return Err(VoiceError::negotiation(
                NegotiationStep::CreateOffer,
                VoiceError::config("no local track attached before negotiation"),
            ));
        }

        let offer = transport
            .create_offer()
            .await
            .map_err(|e| VoiceError::negotiation(NegotiationStep::CreateOffer, e))?;
        debug!(step = %NegotiationStep::CreateOffer, "Created local offer");

        let offer_sdp = offer.sdp.clone();
        transport
            .set_local_description(offer)
            .await
            .map_err(|e| VoiceError::negotiation(NegotiationStep::SetLocalDescription, e))?;
        debug!(step = %NegotiationStep::SetLocalDescription, "Committed local description");

        // Backends that gather candidates asynchronously only expose the
        // final SDP through the committed local description.
        let local_sdp = transport.local_description().await.map(|d| d.sdp).unwrap_or(offer_sdp);

        let answer_sdp = self
            .exchange(credential, &local_sdp)
            .await
            .map_err(|e| VoiceError::negotiation(NegotiationStep::Exchange, e))?;
        debug!(step = %NegotiationStep::Exchange, bytes = answer_sdp.len(), "Received SDP answer");

        transport
            .set_remote_description(SessionDescription::answer(answer_sdp))
            .await
            .map_err(|e| VoiceError::negotiation(NegotiationStep::SetRemoteDescription, e))?;

        info!(model = %self.config.model, "SDP negotiation complete");
        Ok(())
    }

    /// Post the offer and return the answer SDP text.
    async fn exchange(&self, credential: &Credential, offer_sdp: &str) -> Result<String> {
        let response = self
            .http
            .post(self.config.exchange_url())
            .query(&[("model", self.config.model.as_str())])
            .bearer_auth(credential.expose())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| VoiceError::transport(format!("SDP exchange request failed: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::auth(format!(
                "SDP exchange rejected with status {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::transport(format!(
                "SDP exchange failed with status {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::transport(format!("Failed to read SDP answer body: {e}")))?;

        let sdp = if content_type.contains("application/json") {
            serde_json::from_str::<SdpExchangeResponse>(&body)
                .map_err(|e| {
                    VoiceError::protocol(format!("Failed to parse SDP exchange response: {e}"))
                })?
                .sdp
        } else {
            body
        };

        if sdp.trim().is_empty() {
            return Err(VoiceError::protocol("SDP exchange returned an empty answer"));
        }
        Ok(sdp)
    }
}

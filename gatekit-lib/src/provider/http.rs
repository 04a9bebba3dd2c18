//! Reqwest-backed provider client.
//!
//! Requires the `http-client` feature for actual HTTP requests. Without it,
//! [`HttpProviderClient::charge`] returns a transport error explaining the
//! missing feature.

use async_trait::async_trait;
#[cfg(feature = "http-client")]
use std::time::Duration;
use tracing::debug;

use super::{ProviderClient, ProviderResponse};
use crate::config::ChargeEndpointConfig;
use crate::envelope::EncryptedEnvelope;
use crate::{GatewayError, Result};

/// HTTP client for the provider's charge endpoint.
pub struct HttpProviderClient {
    config: ChargeEndpointConfig,
    #[cfg(feature = "http-client")]
    client: reqwest::Client,
}

impl HttpProviderClient {
    /// Create a new client with the given endpoint configuration.
    #[cfg(feature = "http-client")]
    pub fn new(config: ChargeEndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                GatewayError::transport("client init", format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    /// Create a new client (stub when the feature is disabled).
    #[cfg(not(feature = "http-client"))]
    pub fn new(config: ChargeEndpointConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Get the endpoint configuration.
    pub fn config(&self) -> &ChargeEndpointConfig {
        &self.config
    }

    /// POST an envelope to the charge endpoint and read back the body.
    #[cfg(feature = "http-client")]
    async fn post_envelope(&self, envelope: &EncryptedEnvelope) -> Result<(u16, String)> {
        let response = self
            .client
            .post(&self.config.charge_url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            GatewayError::transport("charge", format!("failed to read response body: {e}"))
        })?;

        Ok((status, body))
    }

    /// POST an envelope (stub when the feature is disabled).
    #[cfg(not(feature = "http-client"))]
    async fn post_envelope(&self, _envelope: &EncryptedEnvelope) -> Result<(u16, String)> {
        Err(GatewayError::transport(
            "charge",
            "HTTP client not compiled - enable the 'http-client' feature",
        ))
    }

    /// Map reqwest errors to transport errors.
    #[cfg(feature = "http-client")]
    fn map_reqwest_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::transport(
                "charge",
                format!("timed out after {}s", self.config.timeout_secs),
            )
        } else if e.is_connect() {
            GatewayError::transport(
                "charge",
                format!("connection to {} failed: {e}", self.config.charge_url),
            )
        } else {
            GatewayError::transport("charge", e.to_string())
        }
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn charge(&self, envelope: &EncryptedEnvelope) -> Result<ProviderResponse> {
        debug!(url = %self.config.charge_url, "submitting charge envelope");
        let (status, body) = self.post_envelope(envelope).await?;

        if !(200..300).contains(&status) {
            return Err(GatewayError::transport(
                "charge",
                format!("provider returned HTTP {status}: {body}"),
            ));
        }

        // A body that does not parse as an envelope is still returned; the
        // caller decides whether a missing envelope is fatal.
        let envelope = serde_json::from_str::<EncryptedEnvelope>(&body).ok();
        Ok(ProviderResponse {
            envelope,
            raw: body,
        })
    }
}

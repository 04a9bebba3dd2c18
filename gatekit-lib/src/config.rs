//! Merchant and endpoint configuration.
//!
//! All secret material and endpoint addressing is injected through these
//! structs at construction time. Nothing in this crate reads ambient or
//! process-global state.

use serde::{Deserialize, Serialize};

use crate::{GatewayError, Result};

/// Which provider environment the merchant is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayMode {
    Production,
    Sandbox,
}

/// Per-mode secret material: the AES key and IV for payload encryption and
/// the keyed-hash secret for callback integrity tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// 256-bit cipher key, hex-encoded (64 chars)
    pub key_hex: String,
    /// 96-bit cipher IV, hex-encoded (24 chars)
    pub iv_hex: String,
    /// Secret prepended to the ciphertext when computing the integrity tag
    pub hash_key: String,
}

impl KeyMaterial {
    pub fn new(
        key_hex: impl Into<String>,
        iv_hex: impl Into<String>,
        hash_key: impl Into<String>,
    ) -> Self {
        Self {
            key_hex: key_hex.into(),
            iv_hex: iv_hex.into(),
            hash_key: hash_key.into(),
        }
    }
}

/// Merchant identity plus the key material for each provider environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub merchant_id: String,
    pub mode: GatewayMode,
    pub production: Option<KeyMaterial>,
    pub sandbox: Option<KeyMaterial>,
}

impl MerchantConfig {
    pub fn new(merchant_id: impl Into<String>, mode: GatewayMode) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            mode,
            production: None,
            sandbox: None,
        }
    }

    pub fn with_production_keys(mut self, material: KeyMaterial) -> Self {
        self.production = Some(material);
        self
    }

    pub fn with_sandbox_keys(mut self, material: KeyMaterial) -> Self {
        self.sandbox = Some(material);
        self
    }

    /// Key material for the configured mode.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Crypto` when no material is configured for the
    /// active mode; callers must not fall back to the other environment's
    /// keys.
    pub fn key_material(&self) -> Result<&KeyMaterial> {
        let material = match self.mode {
            GatewayMode::Production => self.production.as_ref(),
            GatewayMode::Sandbox => self.sandbox.as_ref(),
        };
        material.ok_or_else(|| {
            GatewayError::Crypto(format!("no key material configured for {:?} mode", self.mode))
        })
    }
}

/// Addressing for the provider's charge endpoint and the merchant-side
/// return/notify URLs handed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeEndpointConfig {
    /// Stored-credential charge endpoint
    pub charge_url: String,
    /// Browser return URL; the trade reference is appended as a query
    /// parameter when rendered
    pub return_url: String,
    /// Server-to-server notify URL; a clean path with no query string
    pub notify_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ChargeEndpointConfig {
    pub fn new(
        charge_url: impl Into<String>,
        return_url: impl Into<String>,
        notify_url: impl Into<String>,
    ) -> Self {
        Self {
            charge_url: charge_url.into(),
            return_url: return_url.into(),
            notify_url: notify_url.into(),
            timeout_secs: 30,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Render the return URL for a specific trade reference.
    pub fn return_url_for(&self, reference: &str) -> String {
        let separator = if self.return_url.contains('?') { '&' } else { '?' };
        format!("{}{}reference={}", self.return_url, separator, reference)
    }
}

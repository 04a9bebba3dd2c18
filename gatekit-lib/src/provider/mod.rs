//! Provider charge endpoint: request building, response shapes, and the
//! client seam.
//!
//! The [`ProviderClient`] trait is the only way the rest of the system
//! talks to the provider, so tests and embedding hosts can substitute their
//! own transport. [`HttpProviderClient`] is the reqwest-backed
//! implementation (requires the `http-client` feature).

mod http;

pub use http::HttpProviderClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::envelope::{payload_text, EncryptedEnvelope, PayloadMap};
use crate::idempotency;
use crate::{GatewayError, Result};

/// Field names in the provider wire payload.
pub mod fields {
    pub const MERCHANT_ID: &str = "merchant_id";
    pub const TRADE_REF: &str = "trade_ref";
    pub const REQUEST_ID: &str = "request_id";
    pub const AMOUNT: &str = "amount";
    pub const TIMESTAMP: &str = "timestamp";
    pub const DESCRIPTION: &str = "description";
    pub const CREDIT_TOKEN: &str = "credit_token";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const THREE_DS: &str = "three_ds";
    pub const STATUS: &str = "status";
    pub const PROVIDER_TXN: &str = "provider_txn";
    pub const CHALLENGE_URL: &str = "challenge_url";
    pub const MESSAGE: &str = "message";
}

/// Status sentinel the provider uses for a successful charge.
pub const SUCCESS_STATUS: &str = "1";

/// Provider-side cap on the product description.
const MAX_DESCRIPTION_LENGTH: usize = 20;

/// An outbound stored-credential charge request.
///
/// Renders to a flat payload map, which the caller encrypts into an
/// [`EncryptedEnvelope`] before transmission. Each request carries a fresh
/// retry-deduplication token the provider uses to drop resubmitted calls;
/// the token lives only for this one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub merchant_id: String,
    pub trade_ref: String,
    /// Charge amount in the provider's unit; strictly positive
    pub amount: i64,
    pub description: String,
    pub credit_token: String,
    pub customer_id: String,
    pub three_ds: bool,
    /// Retry-deduplication token, generated fresh per attempt
    pub request_id: String,
}

impl ChargeRequest {
    pub fn new(
        merchant_id: impl Into<String>,
        trade_ref: impl Into<String>,
        amount: i64,
        credit_token: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            trade_ref: trade_ref.into(),
            amount,
            description: String::new(),
            credit_token: credit_token.into(),
            customer_id: customer_id.into(),
            three_ds: false,
            request_id: idempotency::generate_key(""),
        }
    }

    /// Tag the retry-deduplication token with a caller prefix (truncated to
    /// the generator's cap). Regenerates the token.
    pub fn with_request_tag(mut self, prefix: &str) -> Self {
        self.request_id = idempotency::generate_key(prefix);
        self
    }

    /// Set the product description, truncated to the provider's cap.
    /// Over-long input is truncated, not rejected.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.chars().take(MAX_DESCRIPTION_LENGTH).collect();
        self
    }

    /// Request a 3-D-secure step-up flow.
    pub fn with_three_ds(mut self, enabled: bool) -> Self {
        self.three_ds = enabled;
        self
    }

    /// Render to the flat wire payload.
    pub fn to_payload(&self) -> PayloadMap {
        let mut payload = PayloadMap::new();
        payload.insert(fields::MERCHANT_ID.to_string(), json!(self.merchant_id));
        payload.insert(fields::TRADE_REF.to_string(), json!(self.trade_ref));
        payload.insert(fields::REQUEST_ID.to_string(), json!(self.request_id));
        payload.insert(fields::AMOUNT.to_string(), json!(self.amount));
        payload.insert(
            fields::TIMESTAMP.to_string(),
            json!(chrono::Utc::now().timestamp()),
        );
        payload.insert(fields::DESCRIPTION.to_string(), json!(self.description));
        payload.insert(fields::CREDIT_TOKEN.to_string(), json!(self.credit_token));
        payload.insert(fields::CUSTOMER_ID.to_string(), json!(self.customer_id));
        if self.three_ds {
            payload.insert(fields::THREE_DS.to_string(), json!("1"));
        }
        payload
    }
}

/// Raw provider response: the envelope if one could be parsed, plus the
/// raw body retained for diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub envelope: Option<EncryptedEnvelope>,
    pub raw: String,
}

/// Decrypted outcome of a charge response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub status: String,
    pub provider_txn: Option<String>,
    pub challenge_url: Option<String>,
    pub message: Option<String>,
    pub trade_ref: Option<String>,
}

impl ChargeOutcome {
    /// Map a decrypted response payload into an outcome.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Protocol` when the status field is missing -
    /// without it the response cannot be classified at all.
    pub fn from_payload(payload: &PayloadMap) -> Result<Self> {
        let status = payload_text(payload, fields::STATUS)
            .ok_or_else(|| GatewayError::protocol("response payload missing status"))?;

        Ok(Self {
            status,
            provider_txn: payload_text(payload, fields::PROVIDER_TXN),
            challenge_url: payload_text(payload, fields::CHALLENGE_URL),
            message: payload_text(payload, fields::MESSAGE),
            trade_ref: payload_text(payload, fields::TRADE_REF),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

/// Client seam for the provider's stored-credential charge endpoint.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit an encrypted charge request and return the raw response.
    ///
    /// Transport failures surface as `GatewayError::Transport`; there is no
    /// internal retry loop.
    async fn charge(&self, envelope: &EncryptedEnvelope) -> Result<ProviderResponse>;
}

//! # Gatekit Gateway Primitives
//!
//! Provider-facing building blocks for the Gatekit payment gateway
//! integration:
//!
//! - [`crypto`]: AES-256-GCM payload encryption and the keyed integrity
//!   hash that authenticates provider callbacks
//! - [`trade_ref`]: the merchant trade reference codec, tolerant of all
//!   historical formats in flight
//! - [`idempotency`]: retry-deduplication tokens for outbound calls
//! - [`provider`]: the charge-endpoint client seam and wire shapes
//! - [`config`]: injected merchant/endpoint configuration
//!
//! ## Security Model
//!
//! Inbound envelopes are authenticated with a constant-time keyed-hash
//! check *before* any decryption is attempted; decryption itself is
//! additionally authenticated by the GCM tag. Key material is injected per
//! provider environment and zeroized on drop.

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod errors;
pub mod idempotency;
pub mod provider;
pub mod trade_ref;

pub use config::{ChargeEndpointConfig, GatewayMode, KeyMaterial, MerchantConfig};
pub use crypto::CipherSuite;
pub use envelope::{payload_text, EncryptedEnvelope, PayloadMap};
pub use errors::{GatewayError, Result};
pub use provider::{
    ChargeOutcome, ChargeRequest, HttpProviderClient, ProviderClient, ProviderResponse,
};

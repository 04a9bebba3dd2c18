//! Inbound callback pipeline.
//!
//! Each provider notification walks a fixed state machine:
//!
//! ```text
//! Received -> Authenticated -> Correlated -> Deduplicated (skip)
//!                                         \-> Applying -> Applied
//!              any failure -------------------------------> Rejected
//! ```
//!
//! Authentication happens before anything else: an envelope that fails the
//! keyed-hash check is rejected without ever reaching the decryption
//! routine. The deduplication ledger is the single source of truth for
//! at-most-once application; a callback whose business effect fails is left
//! unmarked so the provider's redelivery can retry it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use gatekit_lib::crypto::CipherSuite;
use gatekit_lib::envelope::{payload_text, EncryptedEnvelope, PayloadMap};
use gatekit_lib::provider::fields;
use gatekit_lib::trade_ref;

use crate::dedup::{CallbackKind, DedupStore};
use crate::Result;

/// A raw inbound callback as received from the provider.
#[derive(Debug, Clone)]
pub struct InboundCallback {
    pub envelope: EncryptedEnvelope,
    pub kind: CallbackKind,
    /// Reference from the out-of-band query parameter, available for
    /// routing before decryption
    pub routing_reference: Option<String>,
}

impl InboundCallback {
    pub fn new(envelope: EncryptedEnvelope, kind: CallbackKind) -> Self {
        Self {
            envelope,
            kind,
            routing_reference: None,
        }
    }

    pub fn with_routing_reference(mut self, reference: impl Into<String>) -> Self {
        self.routing_reference = Some(reference.into());
        self
    }
}

/// Why a callback was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Integrity tag did not match the ciphertext
    HashMismatch,
    /// Ciphertext failed to decrypt
    DecryptFailed(String),
    /// Decrypted payload carries no trade reference
    MissingTradeReference,
    /// The business effect could not be applied; redelivery will retry
    ApplyFailed(String),
    /// Deduplication store failure
    Internal(String),
}

impl RejectReason {
    /// Stable machine-readable code for logs and provider responses.
    pub fn as_code(&self) -> &'static str {
        match self {
            RejectReason::HashMismatch => "hash_mismatch",
            RejectReason::DecryptFailed(_) => "decrypt_failed",
            RejectReason::MissingTradeReference => "missing_trade_reference",
            RejectReason::ApplyFailed(_) => "apply_failed",
            RejectReason::Internal(_) => "internal_error",
        }
    }
}

/// Terminal disposition of one callback.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// Business effect applied and recorded exactly once
    Applied {
        reference: String,
        kind: CallbackKind,
    },
    /// Already applied earlier; idempotent no-op
    Deduplicated {
        reference: String,
        kind: CallbackKind,
    },
    /// Nothing applied, nothing marked
    Rejected { reason: RejectReason },
}

impl NotifyOutcome {
    fn rejected(reason: RejectReason) -> Self {
        NotifyOutcome::Rejected { reason }
    }
}

/// The business effect behind a callback, owned by the hosting order/
/// subscription layer.
#[async_trait]
pub trait CallbackApplier: Send + Sync {
    /// Apply the state change for a correlated callback. An `Err` leaves
    /// the callback unmarked so redelivery can retry.
    async fn apply(
        &self,
        reference: &str,
        kind: CallbackKind,
        payload: &PayloadMap,
    ) -> Result<()>;
}

/// Drives inbound callbacks through authenticate -> correlate -> dedup ->
/// apply.
pub struct NotifyHandler {
    cipher: CipherSuite,
    dedup: Arc<dyn DedupStore>,
    applier: Arc<dyn CallbackApplier>,
}

impl NotifyHandler {
    pub fn new(
        cipher: CipherSuite,
        dedup: Arc<dyn DedupStore>,
        applier: Arc<dyn CallbackApplier>,
    ) -> Self {
        Self {
            cipher,
            dedup,
            applier,
        }
    }

    /// Process one callback to a terminal state.
    ///
    /// Never errors: every failure mode is a [`NotifyOutcome::Rejected`]
    /// with a reason the web layer can map to a provider response.
    pub async fn handle(&self, callback: InboundCallback) -> NotifyOutcome {
        let routing = callback.routing_reference.as_deref().unwrap_or("-");

        // Received -> Authenticated
        if !self.cipher.verify(&callback.envelope) {
            warn!(routing, kind = %callback.kind, "callback integrity check failed");
            return NotifyOutcome::rejected(RejectReason::HashMismatch);
        }

        // Authenticated -> Correlated
        let payload = match self.cipher.decrypt(&callback.envelope.cipher_payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(routing, kind = %callback.kind, error = %e, "callback decryption failed");
                return NotifyOutcome::rejected(RejectReason::DecryptFailed(e.to_string()));
            }
        };

        let Some(raw_reference) = payload_text(&payload, fields::TRADE_REF) else {
            warn!(routing, kind = %callback.kind, "callback payload has no trade reference");
            return NotifyOutcome::rejected(RejectReason::MissingTradeReference);
        };
        let reference = trade_ref::extract_reference(&raw_reference);

        // Correlated -> Deduplicated?
        match self.dedup.is_processed(&reference, callback.kind).await {
            Ok(true) => {
                debug!(%reference, kind = %callback.kind, "callback already applied, skipping");
                return NotifyOutcome::Deduplicated {
                    reference,
                    kind: callback.kind,
                };
            }
            Ok(false) => {}
            Err(e) => {
                warn!(%reference, error = %e, "deduplication lookup failed");
                return NotifyOutcome::rejected(RejectReason::Internal(e.to_string()));
            }
        }

        // Applying -> Applied
        if let Err(e) = self.applier.apply(&reference, callback.kind, &payload).await {
            warn!(%reference, kind = %callback.kind, error = %e, "callback application failed");
            return NotifyOutcome::rejected(RejectReason::ApplyFailed(e.to_string()));
        }

        let metadata = json!({
            "provider_txn": payload_text(&payload, fields::PROVIDER_TXN),
        });
        match self.dedup.mark_processed(&reference, callback.kind, metadata).await {
            Ok(true) => {
                info!(%reference, kind = %callback.kind, "callback applied");
                NotifyOutcome::Applied {
                    reference,
                    kind: callback.kind,
                }
            }
            Ok(false) => {
                // A concurrent redelivery won the insert race
                debug!(%reference, kind = %callback.kind, "callback marked by concurrent delivery");
                NotifyOutcome::Deduplicated {
                    reference,
                    kind: callback.kind,
                }
            }
            Err(e) => {
                // The effect is already applied; reporting a rejection here
                // would invite a redelivery that re-applies it.
                tracing::error!(%reference, error = %e, "failed to record processed callback");
                NotifyOutcome::Applied {
                    reference,
                    kind: callback.kind,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::MemoryDedupStore;
    use gatekit_lib::config::KeyMaterial;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn test_cipher() -> CipherSuite {
        let material = KeyMaterial::new("2f".repeat(32), "4e".repeat(12), "notify-hash-key");
        CipherSuite::from_material(&material).unwrap()
    }

    /// Counts applications; optionally fails every call.
    #[derive(Default)]
    struct RecordingApplier {
        applied: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl CallbackApplier for RecordingApplier {
        async fn apply(
            &self,
            _reference: &str,
            _kind: CallbackKind,
            _payload: &PayloadMap,
        ) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("order missing");
            }
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn callback_envelope(cipher: &CipherSuite, trade_ref_value: &str) -> EncryptedEnvelope {
        let mut payload = PayloadMap::new();
        payload.insert(fields::TRADE_REF.to_string(), json!(trade_ref_value));
        payload.insert(fields::STATUS.to_string(), json!("1"));
        payload.insert(fields::PROVIDER_TXN.to_string(), json!("P-9001"));
        cipher.encrypt(&payload).unwrap()
    }

    fn handler_with(
        applier: Arc<RecordingApplier>,
    ) -> (NotifyHandler, Arc<MemoryDedupStore>) {
        let dedup = Arc::new(MemoryDedupStore::new());
        let handler = NotifyHandler::new(test_cipher(), dedup.clone(), applier);
        (handler, dedup)
    }

    #[tokio::test]
    async fn test_valid_callback_applied_once() {
        let applier = Arc::new(RecordingApplier::default());
        let (handler, dedup) = handler_with(applier.clone());

        let envelope = callback_envelope(&test_cipher(), "order-77__1700000000_42");
        let callback = InboundCallback::new(envelope, CallbackKind::ChargeSuccess)
            .with_routing_reference("order-77");
        let outcome = handler.handle(callback).await;

        assert_eq!(
            outcome,
            NotifyOutcome::Applied {
                reference: "order-77".to_string(),
                kind: CallbackKind::ChargeSuccess,
            }
        );
        assert_eq!(applier.applied.load(Ordering::SeqCst), 1);
        assert!(dedup
            .is_processed("order-77", CallbackKind::ChargeSuccess)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_redelivery_is_deduplicated() {
        let applier = Arc::new(RecordingApplier::default());
        let (handler, _dedup) = handler_with(applier.clone());

        let envelope = callback_envelope(&test_cipher(), "order-77__1700000000_42");
        let first = handler
            .handle(InboundCallback::new(
                envelope.clone(),
                CallbackKind::ChargeSuccess,
            ))
            .await;
        let second = handler
            .handle(InboundCallback::new(envelope, CallbackKind::ChargeSuccess))
            .await;

        assert!(matches!(first, NotifyOutcome::Applied { .. }));
        assert_eq!(
            second,
            NotifyOutcome::Deduplicated {
                reference: "order-77".to_string(),
                kind: CallbackKind::ChargeSuccess,
            }
        );
        assert_eq!(applier.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forged_tag_rejected_without_side_effects() {
        let applier = Arc::new(RecordingApplier::default());
        let (handler, dedup) = handler_with(applier.clone());

        let mut envelope = callback_envelope(&test_cipher(), "order-77__1700000000_42");
        envelope.integrity_tag = "0".repeat(64);

        let outcome = handler
            .handle(InboundCallback::new(envelope, CallbackKind::ChargeSuccess))
            .await;

        assert_eq!(
            outcome,
            NotifyOutcome::Rejected {
                reason: RejectReason::HashMismatch
            }
        );
        assert_eq!(applier.applied.load(Ordering::SeqCst), 0);
        assert_eq!(dedup.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_garbage_ciphertext_with_valid_tag_rejected() {
        let applier = Arc::new(RecordingApplier::default());
        let (handler, _dedup) = handler_with(applier.clone());

        // Valid keyed hash over garbage: authenticates, then fails decrypt
        let cipher = test_cipher();
        let garbage = "deadbeef".repeat(8);
        let tag = cipher.keyed_hash(&garbage);

        let outcome = handler
            .handle(InboundCallback::new(
                EncryptedEnvelope::new(garbage, tag),
                CallbackKind::ChargeSuccess,
            ))
            .await;

        assert!(matches!(
            outcome,
            NotifyOutcome::Rejected {
                reason: RejectReason::DecryptFailed(_)
            }
        ));
        assert_eq!(applier.applied.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_trade_reference_rejected() {
        let applier = Arc::new(RecordingApplier::default());
        let (handler, _dedup) = handler_with(applier.clone());

        let cipher = test_cipher();
        let mut payload = PayloadMap::new();
        payload.insert(fields::STATUS.to_string(), json!("1"));
        let envelope = cipher.encrypt(&payload).unwrap();

        let outcome = handler
            .handle(InboundCallback::new(envelope, CallbackKind::ChargeSuccess))
            .await;

        assert_eq!(
            outcome,
            NotifyOutcome::Rejected {
                reason: RejectReason::MissingTradeReference
            }
        );
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_callback_unmarked() {
        let applier = Arc::new(RecordingApplier::default());
        applier.fail.store(true, Ordering::SeqCst);
        let (handler, dedup) = handler_with(applier.clone());

        let envelope = callback_envelope(&test_cipher(), "order-77__1700000000_42");
        let outcome = handler
            .handle(InboundCallback::new(
                envelope.clone(),
                CallbackKind::ChargeSuccess,
            ))
            .await;

        assert!(matches!(
            outcome,
            NotifyOutcome::Rejected {
                reason: RejectReason::ApplyFailed(_)
            }
        ));
        assert!(!dedup
            .is_processed("order-77", CallbackKind::ChargeSuccess)
            .await
            .unwrap());

        // Redelivery succeeds once the collaborator recovers
        applier.fail.store(false, Ordering::SeqCst);
        let retried = handler
            .handle(InboundCallback::new(envelope, CallbackKind::ChargeSuccess))
            .await;
        assert!(matches!(retried, NotifyOutcome::Applied { .. }));
        assert_eq!(applier.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_legacy_reference_passes_through() {
        let applier = Arc::new(RecordingApplier::default());
        let (handler, dedup) = handler_with(applier);

        // ID-format reference: no double-underscore, passes through whole
        let envelope = callback_envelope(&test_cipher(), "42A1bc2de3XY");
        let outcome = handler
            .handle(InboundCallback::new(envelope, CallbackKind::ChargeSuccess))
            .await;

        assert_eq!(
            outcome,
            NotifyOutcome::Applied {
                reference: "42A1bc2de3XY".to_string(),
                kind: CallbackKind::ChargeSuccess,
            }
        );
        assert!(dedup
            .is_processed("42A1bc2de3XY", CallbackKind::ChargeSuccess)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_reject_codes() {
        assert_eq!(RejectReason::HashMismatch.as_code(), "hash_mismatch");
        assert_eq!(
            RejectReason::DecryptFailed("x".into()).as_code(),
            "decrypt_failed"
        );
    }
}

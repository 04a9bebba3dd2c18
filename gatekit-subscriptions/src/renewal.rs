//! Scheduled renewal charges against stored credentials.
//!
//! Each run selects a batch of due subscriptions and drives every one
//! through the same build -> charge -> verify -> apply pipeline used for
//! one-off charges. Failures are isolated per subscription: a bad row is
//! moved to `Failing` with a structured last-error and the batch continues.
//!
//! There is no internal retry loop and no cross-run lock. Double-charge
//! safety under overlapping runs rests on the recent-success guard here
//! and on the deduplication ledger gating callback-driven effects.

use std::sync::Arc;

use tracing::{debug, info, warn};

use gatekit_lib::crypto::CipherSuite;
use gatekit_lib::provider::{ChargeOutcome, ChargeRequest, ProviderClient};
use gatekit_lib::trade_ref;
use gatekit_lib::MerchantConfig;

use crate::amount::normalize_amount;
use crate::storage::{RenewalPayment, SubscriptionStore};
use crate::subscription::{interval_days, LastError, Subscription, SubscriptionStatus};
use crate::Result;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Tuning for the renewal batch.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Maximum subscriptions charged per run
    pub batch_size: usize,
    /// Skip a subscription whose last successful charge is younger than
    /// this; guards against overlapping runner invocations
    pub recent_charge_guard_secs: i64,
    /// Product description sent to the provider (truncated to its cap)
    pub description: String,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            recent_charge_guard_secs: 15 * 60,
            description: "Subscription renewal".to_string(),
        }
    }
}

impl RenewalConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_recent_charge_guard_secs(mut self, secs: i64) -> Self {
        self.recent_charge_guard_secs = secs;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Counters for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalReport {
    pub examined: usize,
    pub renewed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// How one subscription fared inside a run.
enum Disposition {
    Renewed,
    /// Recent successful charge; nothing attempted
    Skipped,
    Failed(LastError),
}

/// Drives scheduled stored-credential charges for due subscriptions.
pub struct RenewalRunner {
    merchant: MerchantConfig,
    cipher: CipherSuite,
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn ProviderClient>,
    config: RenewalConfig,
}

impl RenewalRunner {
    /// Create a runner. Fails if the merchant config has no key material
    /// for its active mode.
    pub fn new(
        merchant: MerchantConfig,
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn ProviderClient>,
    ) -> Result<Self> {
        let cipher = CipherSuite::from_material(merchant.key_material()?)?;
        Ok(Self {
            merchant,
            cipher,
            store,
            provider,
            config: RenewalConfig::default(),
        })
    }

    pub fn with_config(mut self, config: RenewalConfig) -> Self {
        self.config = config;
        self
    }

    /// Process one batch of due subscriptions.
    ///
    /// Per-subscription failures become `Failing` transitions; only a
    /// failure to read the batch itself surfaces as an error.
    pub async fn run_once(&self) -> Result<RenewalReport> {
        let now = chrono::Utc::now().timestamp();
        let batch = self
            .store
            .find_due_subscriptions(self.config.batch_size, now)
            .await?;

        let mut report = RenewalReport {
            examined: batch.len(),
            ..Default::default()
        };

        for subscription in &batch {
            match self.renew_one(subscription, now).await {
                Ok(Disposition::Renewed) => report.renewed += 1,
                Ok(Disposition::Skipped) => report.skipped += 1,
                Ok(Disposition::Failed(last_error)) => {
                    self.mark_failing(subscription, last_error).await;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(
                        subscription_id = subscription.subscription_id,
                        error = %e,
                        "renewal attempt errored"
                    );
                    self.mark_failing(subscription, LastError::new(e.to_string(), now))
                        .await;
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            renewed = report.renewed,
            failed = report.failed,
            skipped = report.skipped,
            "renewal run complete"
        );
        Ok(report)
    }

    /// Drive a single subscription through charge and cursor advance.
    async fn renew_one(&self, subscription: &Subscription, now: i64) -> Result<Disposition> {
        let Some(credit_token) = subscription.stored_credit_token.clone() else {
            return Ok(Disposition::Failed(LastError::new(
                "missing_credit_hash",
                now,
            )));
        };
        let Some(customer_email) = subscription.customer_email.clone() else {
            return Ok(Disposition::Failed(LastError::new(
                "missing_customer_email",
                now,
            )));
        };

        // Overlapping-run guard
        if let Some(charged_at) = self
            .store
            .last_successful_charge_at(subscription.subscription_id)
            .await?
        {
            if now - charged_at < self.config.recent_charge_guard_secs {
                debug!(
                    subscription_id = subscription.subscription_id,
                    "recent successful charge, skipping"
                );
                return Ok(Disposition::Skipped);
            }
        }

        let charge_amount = normalize_amount(subscription.amount);
        let reference = trade_ref::generate(subscription.subscription_id);

        let request = ChargeRequest::new(
            &self.merchant.merchant_id,
            &reference,
            charge_amount,
            credit_token,
            customer_email,
        )
        .with_description(&self.config.description)
        .with_request_tag("RENEW");

        let envelope = self.cipher.encrypt(&request.to_payload())?;

        let response = match self.provider.charge(&envelope).await {
            Ok(response) => response,
            Err(e) => {
                return Ok(Disposition::Failed(LastError::new(e.to_string(), now)));
            }
        };

        let Some(response_envelope) = response.envelope else {
            return Ok(Disposition::Failed(
                LastError::new("invalid_response_missing_encryptinfo", now)
                    .with_raw(response.raw),
            ));
        };

        if !self.cipher.verify(&response_envelope) {
            return Ok(Disposition::Failed(
                LastError::new("hash_mismatch", now).with_raw(response.raw),
            ));
        }

        let payload = match self.cipher.decrypt(&response_envelope.cipher_payload) {
            Ok(payload) => payload,
            Err(e) => {
                return Ok(Disposition::Failed(
                    LastError::new(e.to_string(), now).with_raw(response.raw),
                ));
            }
        };

        let outcome = match ChargeOutcome::from_payload(&payload) {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(Disposition::Failed(
                    LastError::new(e.to_string(), now).with_raw(response.raw),
                ));
            }
        };

        // A challenge URL means the customer must re-authenticate out of
        // band; the runner cannot complete this on its own.
        if let Some(challenge_url) = outcome.challenge_url {
            return Ok(Disposition::Failed(
                LastError::new("requires_3d", now).with_raw(challenge_url),
            ));
        }

        if !outcome.is_success() {
            let message = outcome
                .message
                .unwrap_or_else(|| format!("provider status {}", outcome.status));
            return Ok(Disposition::Failed(LastError::new(message, now)));
        }

        self.store
            .record_renewal_payment(
                subscription.subscription_id,
                RenewalPayment {
                    trade_ref: reference,
                    provider_txn: outcome.provider_txn,
                    amount: charge_amount,
                    paid_at: now,
                },
            )
            .await?;

        // Reload before advancing the cursor; a callback may have touched
        // the row while the charge was in flight.
        let current = self
            .store
            .get_subscription(subscription.subscription_id)
            .await?
            .unwrap_or_else(|| subscription.clone());

        // Next due date counts from now, not from the old cursor, so a
        // delayed run does not come out immediately due again.
        let next_billing_at = now + interval_days(&current.billing_interval) * SECONDS_PER_DAY;

        self.store
            .update_billing_state(
                current.subscription_id,
                SubscriptionStatus::Active,
                next_billing_at,
                None,
            )
            .await?;

        info!(
            subscription_id = subscription.subscription_id,
            amount = charge_amount,
            next_billing_at,
            "subscription renewed"
        );
        Ok(Disposition::Renewed)
    }

    /// Record a failure transition; storage errors here are logged, not
    /// propagated, so the batch keeps going.
    async fn mark_failing(&self, subscription: &Subscription, last_error: LastError) {
        warn!(
            subscription_id = subscription.subscription_id,
            reason = %last_error.message,
            "subscription renewal failed"
        );
        if let Err(e) = self
            .store
            .update_billing_state(
                subscription.subscription_id,
                SubscriptionStatus::Failing,
                subscription.next_billing_at,
                Some(last_error),
            )
            .await
        {
            tracing::error!(
                subscription_id = subscription.subscription_id,
                error = %e,
                "failed to record failing state"
            );
        }
    }
}

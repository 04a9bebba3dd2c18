//! Repository seam for subscription billing state.
//!
//! The hosting store owns subscriptions and payments; this core only
//! reaches them through [`SubscriptionStore`]. [`MemorySubscriptionStore`]
//! backs tests and embedding hosts without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::subscription::{LastError, Subscription, SubscriptionStatus};
use crate::Result;

/// A renewal payment recorded against a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalPayment {
    pub trade_ref: String,
    pub provider_txn: Option<String>,
    /// Amount in the provider's unit
    pub amount: i64,
    pub paid_at: i64,
}

/// Storage trait for subscription billing data.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscriptions eligible for an automatic charge: `Active` or
    /// `Trialing`, recurring-credit method, cursor due at `now`. At most
    /// `limit` rows.
    async fn find_due_subscriptions(&self, limit: usize, now: i64) -> Result<Vec<Subscription>>;

    async fn get_subscription(&self, subscription_id: i64) -> Result<Option<Subscription>>;

    /// Persist the billing cursor fields this core owns. `last_error` of
    /// `None` clears any previously recorded failure.
    async fn update_billing_state(
        &self,
        subscription_id: i64,
        status: SubscriptionStatus,
        next_billing_at: i64,
        last_error: Option<LastError>,
    ) -> Result<()>;

    /// Record a completed renewal payment against the subscription.
    async fn record_renewal_payment(
        &self,
        subscription_id: i64,
        payment: RenewalPayment,
    ) -> Result<()>;

    /// Timestamp of the most recent successful charge, if any. Drives the
    /// overlapping-run guard.
    async fn last_successful_charge_at(&self, subscription_id: i64) -> Result<Option<i64>>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Mutex<HashMap<i64, Subscription>>,
    payments: Mutex<HashMap<i64, Vec<RenewalPayment>>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subscription (test/bootstrap helper).
    pub fn insert_subscription(&self, subscription: Subscription) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .expect("MemorySubscriptionStore lock poisoned");
        subscriptions.insert(subscription.subscription_id, subscription);
    }

    /// Payments recorded for a subscription (inspection helper).
    pub fn payments_for(&self, subscription_id: i64) -> Vec<RenewalPayment> {
        let payments = self
            .payments
            .lock()
            .expect("MemorySubscriptionStore lock poisoned");
        payments.get(&subscription_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn find_due_subscriptions(&self, limit: usize, now: i64) -> Result<Vec<Subscription>> {
        let subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;

        let mut due: Vec<Subscription> = subscriptions
            .values()
            .filter(|s| s.uses_recurring_credit() && s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.subscription_id);
        due.truncate(limit);
        Ok(due)
    }

    async fn get_subscription(&self, subscription_id: i64) -> Result<Option<Subscription>> {
        let subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        Ok(subscriptions.get(&subscription_id).cloned())
    }

    async fn update_billing_state(
        &self,
        subscription_id: i64,
        status: SubscriptionStatus,
        next_billing_at: i64,
        last_error: Option<LastError>,
    ) -> Result<()> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;

        let subscription = subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| anyhow!("subscription {subscription_id} not found"))?;
        subscription.status = status;
        subscription.next_billing_at = next_billing_at;
        subscription.last_error = last_error;
        Ok(())
    }

    async fn record_renewal_payment(
        &self,
        subscription_id: i64,
        payment: RenewalPayment,
    ) -> Result<()> {
        let mut payments = self
            .payments
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        payments.entry(subscription_id).or_default().push(payment);
        Ok(())
    }

    async fn last_successful_charge_at(&self, subscription_id: i64) -> Result<Option<i64>> {
        let payments = self
            .payments
            .lock()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        Ok(payments
            .get(&subscription_id)
            .and_then(|p| p.iter().map(|payment| payment.paid_at).max()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn due_subscription(id: i64, now: i64) -> Subscription {
        Subscription::new(id, 10000, "monthly")
            .with_next_billing_at(now - 60)
            .with_credit_token("tok_abc")
            .with_customer_email("buyer@example.com")
    }

    #[tokio::test]
    async fn test_find_due_filters_and_limits() {
        let now = chrono::Utc::now().timestamp();
        let store = MemorySubscriptionStore::new();

        store.insert_subscription(due_subscription(1, now));
        store.insert_subscription(due_subscription(2, now).with_next_billing_at(now + 3600));
        store.insert_subscription(due_subscription(3, now).with_status(SubscriptionStatus::Failing));
        store.insert_subscription(due_subscription(4, now).with_payment_method("invoice"));
        store.insert_subscription(due_subscription(5, now));

        let due = store.find_due_subscriptions(25, now).await.unwrap();
        let ids: Vec<i64> = due.iter().map(|s| s.subscription_id).collect();
        assert_eq!(ids, vec![1, 5]);

        let capped = store.find_due_subscriptions(1, now).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_update_billing_state() {
        let now = chrono::Utc::now().timestamp();
        let store = MemorySubscriptionStore::new();
        store.insert_subscription(due_subscription(1, now));

        store
            .update_billing_state(
                1,
                SubscriptionStatus::Failing,
                now,
                Some(LastError::new("missing_credit_hash", now)),
            )
            .await
            .unwrap();

        let sub = store.get_subscription(1).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Failing);
        assert_eq!(sub.last_error.unwrap().message, "missing_credit_hash");

        store
            .update_billing_state(1, SubscriptionStatus::Active, now + 86400, None)
            .await
            .unwrap();
        let sub = store.get_subscription(1).await.unwrap().unwrap();
        assert!(sub.last_error.is_none());
        assert_eq!(sub.next_billing_at, now + 86400);
    }

    #[tokio::test]
    async fn test_update_unknown_subscription_fails() {
        let store = MemorySubscriptionStore::new();
        let result = store
            .update_billing_state(99, SubscriptionStatus::Active, 0, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_payment_recording_and_latest_charge() {
        let now = chrono::Utc::now().timestamp();
        let store = MemorySubscriptionStore::new();
        store.insert_subscription(due_subscription(1, now));

        assert_eq!(store.last_successful_charge_at(1).await.unwrap(), None);

        store
            .record_renewal_payment(
                1,
                RenewalPayment {
                    trade_ref: "1Aabc12XY".to_string(),
                    provider_txn: Some("P-1".to_string()),
                    amount: 100,
                    paid_at: now - 600,
                },
            )
            .await
            .unwrap();
        store
            .record_renewal_payment(
                1,
                RenewalPayment {
                    trade_ref: "1Adef34ZQ".to_string(),
                    provider_txn: Some("P-2".to_string()),
                    amount: 100,
                    paid_at: now,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.last_successful_charge_at(1).await.unwrap(), Some(now));
        assert_eq!(store.payments_for(1).len(), 2);
    }
}

use serde::{Deserialize, Serialize};

/// Payment method marker for subscriptions billed against a stored
/// credential.
pub const RECURRING_CREDIT_METHOD: &str = "recurring_credit";

/// Billing lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Failing,
    Canceled,
    Expired,
}

/// Structured record of the most recent renewal failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub occurred_at: i64,
    /// Raw payload or URL retained for diagnosis
    pub raw: Option<String>,
}

impl LastError {
    pub fn new(message: impl Into<String>, occurred_at: i64) -> Self {
        Self {
            message: message.into(),
            occurred_at,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// A recurring subscription as seen by the billing core.
///
/// The entity is owned by the hosting store; this core reads it through
/// [`crate::SubscriptionStore`] and mutates only `status`,
/// `next_billing_at`, and `last_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: i64,
    pub status: SubscriptionStatus,
    /// Renewal cursor: when the next automatic charge attempt is due
    pub next_billing_at: i64,
    pub payment_method: String,
    pub stored_credit_token: Option<String>,
    pub customer_email: Option<String>,
    /// Interval descriptor, e.g. "monthly" or "every 2 weeks"
    pub billing_interval: String,
    /// Recurring amount in minor units
    pub amount: i64,
    pub last_error: Option<LastError>,
}

impl Subscription {
    pub fn new(subscription_id: i64, amount: i64, billing_interval: impl Into<String>) -> Self {
        Self {
            subscription_id,
            status: SubscriptionStatus::Active,
            next_billing_at: chrono::Utc::now().timestamp(),
            payment_method: RECURRING_CREDIT_METHOD.to_string(),
            stored_credit_token: None,
            customer_email: None,
            billing_interval: billing_interval.into(),
            amount,
            last_error: None,
        }
    }

    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_next_billing_at(mut self, next_billing_at: i64) -> Self {
        self.next_billing_at = next_billing_at;
        self
    }

    pub fn with_credit_token(mut self, token: impl Into<String>) -> Self {
        self.stored_credit_token = Some(token.into());
        self
    }

    pub fn with_customer_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = method.into();
        self
    }

    pub fn uses_recurring_credit(&self) -> bool {
        self.payment_method == RECURRING_CREDIT_METHOD
    }

    /// Whether this subscription is eligible for an automatic charge at
    /// `now`.
    pub fn is_due(&self, now: i64) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        ) && self.next_billing_at <= now
    }
}

/// Resolve an interval descriptor to a day count.
///
/// Known descriptors resolve directly; anything else that still mentions a
/// unit falls back to substring matching, and the floor is one day.
pub fn interval_days(descriptor: &str) -> i64 {
    let normalized = descriptor.trim().to_ascii_lowercase();
    let days = match normalized.as_str() {
        "daily" => 1,
        "weekly" => 7,
        "monthly" => 30,
        "yearly" | "annually" => 365,
        _ => 1,
    };
    if days == 1 && normalized != "daily" {
        if normalized.contains("year") {
            365
        } else if normalized.contains("month") {
            30
        } else if normalized.contains("week") {
            7
        } else {
            1
        }
    } else {
        days
    }
}

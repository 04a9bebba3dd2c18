//! # Gatekit Recurring Billing
//!
//! The billing half of the Gatekit gateway integration: scheduled renewal
//! charges against stored credentials, the inbound callback pipeline, and
//! the deduplication ledger that keeps both at-most-once.
//!
//! Key guarantees:
//! - A callback is authenticated before any decryption is attempted
//! - A (reference, kind) pair is applied at most once, enforced by an
//!   atomic check-and-insert in the deduplication store
//! - A failed renewal moves the subscription to `Failing` with a
//!   structured last-error and never blocks the rest of the batch

pub mod amount;
pub mod dedup;
pub mod notify;
pub mod renewal;
pub mod storage;
pub mod subscription;

// Platform-specific modules
#[cfg(not(target_arch = "wasm32"))]
pub mod monitor;

pub use amount::normalize_amount;
pub use dedup::{CallbackKind, DedupRecord, DedupStore, MemoryDedupStore, DEFAULT_RETENTION};
pub use notify::{CallbackApplier, InboundCallback, NotifyHandler, NotifyOutcome, RejectReason};
pub use renewal::{RenewalConfig, RenewalReport, RenewalRunner};
pub use storage::{MemorySubscriptionStore, RenewalPayment, SubscriptionStore};
pub use subscription::{
    interval_days, LastError, Subscription, SubscriptionStatus, RECURRING_CREDIT_METHOD,
};

#[cfg(not(target_arch = "wasm32"))]
pub use monitor::RenewalMonitor;

pub type Result<T> = anyhow::Result<T>;

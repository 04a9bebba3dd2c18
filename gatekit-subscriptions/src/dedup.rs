//! Webhook deduplication ledger.
//!
//! Payment providers redeliver callbacks; without this gate a redelivered
//! "charge succeeded" notification would double-apply a renewal payment.
//! The store records which (reference, kind) pairs have already been
//! applied.
//!
//! # Security
//!
//! - [`DedupStore::mark_processed`] is an atomic check-and-insert: under
//!   concurrent redelivery exactly one caller observes a fresh insert
//! - Stale records are purged by [`DedupStore::cleanup`] to bound growth
//! - [`MemoryDedupStore`] is thread-safe (RwLock)

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default retention for processed-callback records.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Category of inbound notification, part of the deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackKind {
    ChargeSuccess,
    Refund,
    Dispute,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::ChargeSuccess => "charge_success",
            CallbackKind::Refund => "refund",
            CallbackKind::Dispute => "dispute",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A processed (reference, kind) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub trade_reference: String,
    pub kind: CallbackKind,
    pub processed_at: i64,
    pub metadata: serde_json::Value,
}

/// Ledger of callbacks that have already been applied.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether a record exists for this (reference, kind) pair.
    async fn is_processed(&self, reference: &str, kind: CallbackKind) -> Result<bool>;

    /// Atomically record the pair as processed.
    ///
    /// Returns `true` iff the record was newly created. A concurrent
    /// duplicate insert is a no-op returning `false` - never a duplicate
    /// row.
    async fn mark_processed(
        &self,
        reference: &str,
        kind: CallbackKind,
        metadata: serde_json::Value,
    ) -> Result<bool>;

    /// Purge records older than `older_than`. Returns the number removed.
    /// Safe to run concurrently with the other operations.
    async fn cleanup(&self, older_than: Duration) -> Result<usize>;

    /// Number of tracked records (monitoring).
    async fn count(&self) -> Result<usize>;
}

/// In-memory deduplication ledger.
#[derive(Default)]
pub struct MemoryDedupStore {
    records: RwLock<HashMap<(String, CallbackKind), DedupRecord>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn is_processed(&self, reference: &str, kind: CallbackKind) -> Result<bool> {
        let records = self
            .records
            .read()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        Ok(records.contains_key(&(reference.to_string(), kind)))
    }

    async fn mark_processed(
        &self,
        reference: &str,
        kind: CallbackKind,
        metadata: serde_json::Value,
    ) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;

        let key = (reference.to_string(), kind);
        if records.contains_key(&key) {
            return Ok(false);
        }

        records.insert(
            key,
            DedupRecord {
                trade_reference: reference.to_string(),
                kind,
                processed_at: chrono::Utc::now().timestamp(),
                metadata,
            },
        );
        Ok(true)
    }

    async fn cleanup(&self, older_than: Duration) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp() - older_than.as_secs() as i64;
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;

        let before = records.len();
        records.retain(|_, record| record.processed_at >= cutoff);
        Ok(before - records.len())
    }

    async fn count(&self) -> Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        Ok(records.len())
    }
}

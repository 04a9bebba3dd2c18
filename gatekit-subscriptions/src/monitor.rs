//! Background driving of renewal runs (native only - not available in
//! WASM environments).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error};

use crate::dedup::{DedupStore, DEFAULT_RETENTION};
use crate::renewal::{RenewalReport, RenewalRunner};
use crate::Result;

/// Periodic harness around [`RenewalRunner`]: one renewal batch plus one
/// deduplication cleanup per tick.
pub struct RenewalMonitor {
    runner: Arc<RenewalRunner>,
    dedup: Arc<dyn DedupStore>,
    check_interval: Duration,
    retention: Duration,
}

impl RenewalMonitor {
    pub fn new(
        runner: Arc<RenewalRunner>,
        dedup: Arc<dyn DedupStore>,
        check_interval: Duration,
    ) -> Self {
        Self {
            runner,
            dedup,
            check_interval,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Create with default check interval (1 hour).
    pub fn with_default_interval(runner: Arc<RenewalRunner>, dedup: Arc<dyn DedupStore>) -> Self {
        Self::new(runner, dedup, Duration::from_secs(3600))
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Run forever, surviving per-tick failures.
    pub async fn start(&self) {
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "renewal tick failed");
            }
            sleep(self.check_interval).await;
        }
    }

    /// One renewal batch and one ledger cleanup.
    pub async fn tick(&self) -> Result<RenewalReport> {
        let report = self.runner.run_once().await?;
        let purged = self.dedup.cleanup(self.retention).await?;
        debug!(purged, "deduplication ledger cleaned");
        Ok(report)
    }
}

//! Periodic housekeeping.
//!
//! Purges expired replay fingerprints and locks, and drops idle rate-limit
//! buckets so per-IP state stays bounded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::lock::DistributedLock;
use crate::observability::metrics;
use crate::webhook::WebhookPipeline;

pub struct Maintenance {
    pipeline: Arc<WebhookPipeline>,
    locks: DistributedLock,
    interval: Duration,
    bucket_idle: Duration,
}

impl Maintenance {
    pub fn new(
        pipeline: Arc<WebhookPipeline>,
        locks: DistributedLock,
        interval: Duration,
        bucket_idle: Duration,
    ) -> Self {
        Self {
            pipeline,
            locks,
            interval,
            bucket_idle,
        }
    }

    /// One purge pass.
    pub async fn run_once(&self) {
        match self.pipeline.replay().purge_expired().await {
            Ok(purged) if purged > 0 => tracing::debug!(purged, "Expired replay entries purged"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Replay purge failed"),
        }
        if let Some(count) = self.pipeline.replay().len_hint() {
            metrics::record_replay_entries(count);
        }

        match self.locks.purge_expired().await {
            Ok(purged) if purged > 0 => tracing::debug!(purged, "Expired locks purged"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Lock purge failed"),
        }

        let swept = self.pipeline.limiter().sweep_idle(self.bucket_idle);
        if swept > 0 {
            tracing::debug!(swept, "Idle rate limit buckets dropped");
        }
    }

    /// Run until shutdown fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once().await,
                _ = shutdown.recv() => {
                    tracing::debug!("Maintenance task stopping");
                    break;
                }
            }
        }
    }
}

//! Live pipeline counters for the admin API.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::webhook::reject::RejectReason;

#[derive(Debug, Default)]
pub struct PipelineStats {
    accepted: AtomicU64,
    rejected: [AtomicU64; RejectReason::ALL.len()],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rejected: BTreeMap<&'static str, u64>,
}

impl StatsSnapshot {
    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        self.rejected[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let rejected = RejectReason::ALL
            .iter()
            .map(|r| (r.code(), self.rejected[r.index()].load(Ordering::Relaxed)))
            .collect();
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_per_reason() {
        let stats = PipelineStats::new();
        stats.record_accepted();
        stats.record_rejected(RejectReason::DuplicateRequest);
        stats.record_rejected(RejectReason::DuplicateRequest);
        stats.record_rejected(RejectReason::RateLimited);

        let snap = stats.snapshot();
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.rejected["duplicate_request"], 2);
        assert_eq!(snap.rejected["rate_limited"], 1);
        assert_eq!(snap.rejected["internal_error"], 0);
        assert_eq!(snap.rejected.len(), 6);
        assert_eq!(snap.total_rejected(), 3);
    }
}

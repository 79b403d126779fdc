//! Best-effort distributed lock.
//!
//! `acquire` is an atomic set-if-absent with expiry; `release` is an atomic
//! compare-and-delete on the holder's token. An expired holder counts as
//! absent, so a crashed holder blocks the key for at most one TTL.
//!
//! The lock is only as strong as its `LockStore`: process-local with the
//! memory backend, shared across instances with Redis.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::observability::metrics;
use crate::store::{LockStore, StoreError};

pub mod booking;

pub use booking::{BookingBackend, BookingCoordinator, BookingOutcome, BookingRequest};

/// Proof of ownership returned by `acquire`. Opaque 128-bit random value.
#[derive(Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockToken(<redacted>)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("lock ttl must be greater than zero")]
    InvalidTtl,
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Take the lock on `key` for `ttl`. `Ok(None)` when another holder is live.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let token = LockToken::generate();
        if self.store.set_if_absent(key, token.as_str(), ttl).await? {
            metrics::record_lock_event("acquired");
            tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
            Ok(Some(token))
        } else {
            metrics::record_lock_event("contended");
            tracing::debug!(key = %key, "Lock held by another owner");
            Ok(None)
        }
    }

    /// Release `key` if `token` still owns it. A mismatch is a no-op returning `false`.
    pub async fn release(&self, key: &str, token: &LockToken) -> Result<bool, LockError> {
        let released = self.store.compare_and_delete(key, token.as_str()).await?;
        if released {
            metrics::record_lock_event("released");
        } else {
            metrics::record_lock_event("release_mismatch");
            tracing::debug!(key = %key, "Lock release ignored: not the holder or already expired");
        }
        Ok(released)
    }

    pub async fn purge_expired(&self) -> Result<usize, LockError> {
        let purged = self.store.purge_expired().await?;
        for _ in 0..purged {
            metrics::record_lock_event("expired");
        }
        Ok(purged)
    }

    pub fn held_hint(&self) -> Option<usize> {
        self.store.held_hint()
    }
}

//! Replay protection.
//!
//! A fingerprint is SHA-256 over `"{timestamp}:{body}"`, so an identical
//! body sent with a new timestamp is a new delivery. Fingerprints are kept
//! for the replay window in an injected `ReplayStore`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::store::{ReplayStore, StoreError};

/// Replay-dedup key for one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn derive(timestamp: i64, body: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(body);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix safe to log.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplicates deliveries within a time window.
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn ReplayStore>,
    window: Duration,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn ReplayStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn is_duplicate(&self, fingerprint: &RequestFingerprint) -> Result<bool, StoreError> {
        self.store.contains(fingerprint.as_str()).await
    }

    pub async fn remember(&self, fingerprint: &RequestFingerprint) -> Result<(), StoreError> {
        self.store
            .insert_if_absent(fingerprint.as_str(), self.window)
            .await
            .map(|_| ())
    }

    /// Atomic check-and-insert. `Ok(true)` means first sighting.
    pub async fn check_and_remember(&self, fingerprint: &RequestFingerprint) -> Result<bool, StoreError> {
        self.store
            .insert_if_absent(fingerprint.as_str(), self.window)
            .await
    }

    /// Release a claim so the provider's retry is processed.
    pub async fn forget(&self, fingerprint: &RequestFingerprint) -> Result<(), StoreError> {
        self.store.remove(fingerprint.as_str()).await
    }

    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.store.purge_expired().await
    }

    pub fn len_hint(&self) -> Option<usize> {
        self.store.len_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryReplayStore;

    fn guard() -> ReplayGuard {
        ReplayGuard::new(Arc::new(MemoryReplayStore::new(1000)), Duration::from_secs(3600))
    }

    #[test]
    fn test_fingerprint_depends_on_timestamp_and_body() {
        let a = RequestFingerprint::derive(1_700_000_000, b"{}");
        let b = RequestFingerprint::derive(1_700_000_000, b"{}");
        let c = RequestFingerprint::derive(1_700_000_001, b"{}");
        let d = RequestFingerprint::derive(1_700_000_000, b"{ }");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[tokio::test]
    async fn test_same_timestamp_and_body_is_duplicate() {
        let guard = guard();
        let first = RequestFingerprint::derive(1_700_000_000, b"payload");
        let again = RequestFingerprint::derive(1_700_000_000, b"payload");
        let later = RequestFingerprint::derive(1_700_000_060, b"payload");

        assert!(guard.check_and_remember(&first).await.unwrap());
        assert!(!guard.check_and_remember(&again).await.unwrap());
        assert!(guard.check_and_remember(&later).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_duplicate_and_remember() {
        let guard = guard();
        let fp = RequestFingerprint::derive(1, b"x");

        assert!(!guard.is_duplicate(&fp).await.unwrap());
        guard.remember(&fp).await.unwrap();
        assert!(guard.is_duplicate(&fp).await.unwrap());

        guard.forget(&fp).await.unwrap();
        assert!(!guard.is_duplicate(&fp).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let guard = guard();
        let fp = RequestFingerprint::derive(42, b"race");
        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = guard.clone();
            let fp = fp.clone();
            handles.push(tokio::spawn(async move { guard.check_and_remember(&fp).await.unwrap() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

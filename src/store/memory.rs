//! Process-local stores.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::observability::metrics;
use crate::store::{LockStore, ReplayStore, StoreError};

/// Bounded replay set with time-ordered eviction.
///
/// Expired entries go first. When the set is full, the oldest live entry is
/// evicted to make room; the set is never cleared wholesale.
pub struct MemoryReplayStore {
    window: Mutex<ReplayWindow>,
}

struct ReplayWindow {
    /// key -> expiry
    seen: HashMap<String, Instant>,
    /// (expiry, key) in insertion order. May hold stale pairs for keys that
    /// were removed or re-inserted; those are skipped on pop.
    order: VecDeque<(Instant, String)>,
    max_entries: usize,
}

impl ReplayWindow {
    fn purge(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some((expires_at, _)) = self.order.front() {
            if *expires_at > now {
                break;
            }
            if let Some((expires_at, key)) = self.order.pop_front() {
                if self.seen.get(&key) == Some(&expires_at) {
                    self.seen.remove(&key);
                    removed += 1;
                }
            }
        }
        removed
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((expires_at, key)) = self.order.pop_front() {
            if self.seen.get(&key) == Some(&expires_at) {
                self.seen.remove(&key);
                return true;
            }
        }
        false
    }

    /// Drop stale pairs once they outnumber live entries.
    fn compact(&mut self) {
        if self.order.len() <= self.max_entries.saturating_mul(2) {
            return;
        }
        let seen = &self.seen;
        self.order
            .retain(|(expires_at, key)| seen.get(key) == Some(expires_at));
    }

    fn remove(&mut self, key: &str) {
        self.seen.remove(key);
        self.compact();
    }

    fn insert_if_absent(&mut self, key: &str, ttl: Duration, now: Instant) -> bool {
        self.purge(now);
        if self.seen.get(key).is_some_and(|expires_at| *expires_at > now) {
            return false;
        }

        while self.seen.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
            metrics::record_replay_eviction();
        }

        let expires_at = expiry(now, ttl);
        self.seen.insert(key.to_string(), expires_at);
        self.order.push_back((expires_at, key.to_string()));
        true
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl).unwrap_or(now + Duration::from_secs(365 * 24 * 3600))
}

impl MemoryReplayStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            window: Mutex::new(ReplayWindow {
                seen: HashMap::new(),
                order: VecDeque::new(),
                max_entries: max_entries.max(1),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplayWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.lock().insert_if_absent(key, ttl, Instant::now()))
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self.lock().seen.get(key).is_some_and(|expires_at| *expires_at > now))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(self.lock().purge(Instant::now()))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// Lock table keyed by resource.
#[derive(Default)]
pub struct MemoryLockStore {
    locks: DashMap<String, HeldLock>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let held = HeldLock {
            token: token.to_string(),
            expires_at: expiry(now, ttl),
        };
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().expires_at > now {
                    return Ok(false);
                }
                e.insert(held);
                Ok(true)
            }
            Entry::Vacant(e) => {
                e.insert(held);
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = self
            .locks
            .remove_if(key, |_, held| held.token.as_bytes().ct_eq(token.as_bytes()).into());
        Ok(removed.is_some_and(|(_, held)| held.expires_at > now))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.locks.len();
        self.locks.retain(|_, held| held.expires_at > now);
        Ok(before.saturating_sub(self.locks.len()))
    }

    fn held_hint(&self) -> Option<usize> {
        let now = Instant::now();
        Some(self.locks.iter().filter(|e| e.value().expires_at > now).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_replay_insert_once() {
        let store = MemoryReplayStore::new(100);
        assert!(store.insert_if_absent("a", HOUR).await.unwrap());
        assert!(!store.insert_if_absent("a", HOUR).await.unwrap());
        assert!(store.contains("a").await.unwrap());
        assert!(!store.contains("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_expiry() {
        let store = MemoryReplayStore::new(100);
        assert!(store.insert_if_absent("a", Duration::from_millis(30)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!store.contains("a").await.unwrap());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.insert_if_absent("a", HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_capacity_evicts_oldest_only() {
        let store = MemoryReplayStore::new(3);
        for key in ["a", "b", "c"] {
            assert!(store.insert_if_absent(key, HOUR).await.unwrap());
        }
        assert!(store.insert_if_absent("d", HOUR).await.unwrap());

        assert_eq!(store.len(), 3);
        assert!(!store.contains("a").await.unwrap());
        for key in ["b", "c", "d"] {
            assert!(store.contains(key).await.unwrap(), "{key} evicted");
        }
    }

    #[tokio::test]
    async fn test_replay_remove_then_reinsert() {
        let store = MemoryReplayStore::new(2);
        assert!(store.insert_if_absent("a", HOUR).await.unwrap());
        store.remove("a").await.unwrap();
        assert!(store.insert_if_absent("a", HOUR).await.unwrap());
        assert!(store.insert_if_absent("b", HOUR).await.unwrap());

        // The stale ("a", first expiry) pair is skipped; the live "a" is
        // still the oldest entry and goes first.
        assert!(store.insert_if_absent("c", HOUR).await.unwrap());
        assert_eq!(store.len(), 2);
        assert!(!store.contains("a").await.unwrap());
        assert!(store.contains("b").await.unwrap());
        assert!(store.contains("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_released_claims_stay_bounded() {
        let store = MemoryReplayStore::new(4);
        for i in 0..100 {
            let key = format!("k{i}");
            assert!(store.insert_if_absent(&key, HOUR).await.unwrap());
            store.remove(&key).await.unwrap();
        }
        assert!(store.is_empty());
        assert!(store.lock().order.len() <= 8);

        assert!(store.insert_if_absent("k0", HOUR).await.unwrap());
        assert!(!store.insert_if_absent("k0", HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_set_and_compare_delete() {
        let store = MemoryLockStore::new();
        assert!(store.set_if_absent("k", "t1", HOUR).await.unwrap());
        assert!(!store.set_if_absent("k", "t2", HOUR).await.unwrap());

        assert!(!store.compare_and_delete("k", "t2").await.unwrap());
        assert_eq!(store.held_hint(), Some(1));

        assert!(store.compare_and_delete("k", "t1").await.unwrap());
        assert_eq!(store.held_hint(), Some(0));
        assert!(store.set_if_absent("k", "t2", HOUR).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_expired_holder_is_replaced() {
        let store = MemoryLockStore::new();
        assert!(store.set_if_absent("k", "old", Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.set_if_absent("k", "new", HOUR).await.unwrap());
        // The stale holder cannot release the new holder's lock.
        assert!(!store.compare_and_delete("k", "old").await.unwrap());
        assert!(store.compare_and_delete("k", "new").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_purge_expired() {
        let store = MemoryLockStore::new();
        store.set_if_absent("a", "t", Duration::from_millis(10)).await.unwrap();
        store.set_if_absent("b", "t", HOUR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.held_hint(), Some(1));
    }
}

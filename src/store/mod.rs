//! Shared state stores.
//!
//! # Data Flow
//! ```text
//! security/replay.rs  ──▶ ReplayStore (insert-if-absent with expiry)
//! lock/mod.rs         ──▶ LockStore   (set-if-absent, compare-and-delete)
//!
//! Backends:
//!     memory.rs  single instance, process-local
//!     redis.rs   shared across instances (feature `redis-store`)
//! ```
//!
//! Handlers never reach for globals; a `Stores` value is built once at
//! startup and injected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ReplayConfig, StoreBackend, StoreConfig};

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use memory::{MemoryLockStore, MemoryReplayStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend {0:?} is not compiled in")]
    Unsupported(StoreBackend),
}

/// Set of remembered keys with per-entry expiry.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Insert `key` unless a live entry exists. Returns `true` when inserted.
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Whether a live entry exists for `key`.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Entry count, when the backend can report it cheaply.
    fn len_hint(&self) -> Option<usize>;
}

/// Atomic conditional-write capability backing the distributed lock.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `token` under `key` unless a live holder exists.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if it currently holds `token`.
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError>;

    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Live lock count, when the backend can report it cheaply.
    fn held_hint(&self) -> Option<usize>;
}

/// The stores a gateway instance runs against.
#[derive(Clone)]
pub struct Stores {
    pub replay: Arc<dyn ReplayStore>,
    pub locks: Arc<dyn LockStore>,
}

impl Stores {
    pub fn in_memory(max_replay_entries: usize) -> Self {
        Self {
            replay: Arc::new(MemoryReplayStore::new(max_replay_entries)),
            locks: Arc::new(MemoryLockStore::new()),
        }
    }

    /// Build the configured backend, connecting to it if needed.
    pub async fn from_config(store: &StoreConfig, replay: &ReplayConfig) -> Result<Self, StoreError> {
        match store.backend {
            StoreBackend::Memory => Ok(Self::in_memory(replay.max_entries)),
            #[cfg(feature = "redis-store")]
            StoreBackend::Redis => {
                let url = store.redis_url.as_deref().unwrap_or_default();
                let prefix = store.key_prefix.clone().unwrap_or_else(|| "webhook-guard".to_string());
                let redis = Arc::new(self::redis::RedisStore::connect(url, prefix).await?);
                Ok(Self {
                    replay: redis.clone(),
                    locks: redis,
                })
            }
            #[cfg(not(feature = "redis-store"))]
            StoreBackend::Redis => Err(StoreError::Unsupported(StoreBackend::Redis)),
        }
    }
}

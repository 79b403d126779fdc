//! Token bucket rate limiting.
//!
//! Admission control only: `try_acquire` never waits. Buckets are keyed by
//! source (client IP inbound, provider name outbound).

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::BucketConfig;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whether refill alone would have topped the bucket up by `now`.
    fn is_full_at(&self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * refill_rate >= capacity
    }
}

/// Keyed token bucket limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    /// Tokens per second.
    refill_rate: f64,
}

impl RateLimiter {
    /// `capacity` tokens, refilled in full over `interval`.
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        let secs = interval.as_secs_f64().max(f64::EPSILON);
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate: capacity / secs,
        }
    }

    pub fn from_config(config: &BucketConfig) -> Self {
        Self::new(config.capacity, Duration::from_millis(config.interval_ms))
    }

    /// Take one token for `key`. Returns `false` immediately when empty.
    pub fn try_acquire(&self, key: &str) -> bool {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(self.capacity, self.refill_rate);
        }
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity))
            .try_acquire(self.capacity, self.refill_rate)
    }

    /// Drop buckets that are full and untouched for `idle_for`. Returns how
    /// many were dropped.
    ///
    /// A dropped bucket comes back full, so a partly drained one is kept
    /// however long it has been idle.
    pub fn sweep_idle(&self, idle_for: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_update) < idle_for
                || !bucket.is_full_at(now, self.capacity, self.refill_rate)
        });
        before.saturating_sub(self.buckets.len())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_plus_one() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60));
        let accepted = (0..101).filter(|_| limiter.try_acquire("10.0.0.1")).count();
        assert_eq!(accepted, 100);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.try_acquire("a"));
        }
        assert!(!limiter.try_acquire("a"));

        for _ in 0..3 {
            assert!(limiter.try_acquire("b"), "key b affected by key a");
        }
        assert!(!limiter.try_acquire("b"));
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn test_refill_over_time() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        assert!(limiter.try_acquire("k"));
        assert!(limiter.try_acquire("k"));
        assert!(!limiter.try_acquire("k"));

        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.try_acquire("k"));
    }

    #[test]
    fn test_sweep_idle() {
        // Refills in full every 20ms, so "old" is full again after the sleep.
        let limiter = RateLimiter::new(5, Duration::from_millis(20));
        limiter.try_acquire("old");
        std::thread::sleep(Duration::from_millis(50));
        limiter.try_acquire("fresh");

        assert_eq!(limiter.sweep_idle(Duration::from_millis(25)), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_sweep_keeps_drained_bucket() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(!limiter.try_acquire("10.0.0.1"));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(limiter.sweep_idle(Duration::from_millis(25)), 0);
        assert_eq!(limiter.bucket_count(), 1);

        let extra = (0..2).filter(|_| limiter.try_acquire("10.0.0.1")).count();
        assert_eq!(extra, 0, "drained bucket refilled by the sweep");
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_exceeds_capacity() {
        let limiter = std::sync::Arc::new(RateLimiter::new(50, Duration::from_secs(3600)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.try_acquire("shared")).count()
            }));
        }
        let mut total = 0;
        for h in handles {
            total += h.await.unwrap();
        }
        assert_eq!(total, 50);
    }
}

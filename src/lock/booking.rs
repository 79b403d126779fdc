//! Slot booking under the distributed lock.
//!
//! ```text
//! book(request)
//!     → outbound token (per backend)     none → Throttled
//!     → lock booking_{stylist}_{start}   held → SlotBusy
//!     → availability re-check            gone → SlotTaken
//!     → create                           err  → Failed
//!     → Confirmed { booking_id, code }
//! lock released on every path
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GatewayConfig;
use crate::lock::{DistributedLock, LockToken};
use crate::observability::metrics;
use crate::security::RateLimiter;
use crate::store::LockStore;

/// Limiter key for calls into the booking backend.
pub const OUTBOUND_LIMIT_KEY: &str = "square";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub stylist_id: String,
    /// RFC 3339 start time, as the backend reports it.
    pub start_at: String,
    pub customer_id: String,
    pub service_id: String,
    pub duration_minutes: u32,
}

impl BookingRequest {
    pub fn lock_key(&self) -> String {
        format!("booking_{}_{}", self.stylist_id, self.start_at)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingBackendError {
    #[error("booking backend unavailable: {0}")]
    Unavailable(String),

    #[error("booking rejected: {0}")]
    Rejected(String),
}

/// The scheduling system holding the real calendar.
#[async_trait]
pub trait BookingBackend: Send + Sync {
    async fn is_slot_available(&self, request: &BookingRequest) -> Result<bool, BookingBackendError>;

    /// Create the booking and return its backend id.
    async fn create_booking(&self, request: &BookingRequest) -> Result<String, BookingBackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BookingOutcome {
    Confirmed {
        booking_id: String,
        confirmation_code: String,
    },
    SlotBusy,
    SlotTaken,
    Throttled,
    Failed,
}

impl BookingOutcome {
    /// Customer-facing text.
    pub fn message(&self) -> &'static str {
        match self {
            BookingOutcome::Confirmed { .. } => "Appointment confirmed.",
            BookingOutcome::SlotBusy => "This slot is being booked by another customer. Please try again.",
            BookingOutcome::SlotTaken => "This slot was just booked. Please select another time.",
            BookingOutcome::Throttled => "We're handling a lot of bookings right now. Please try again in a moment.",
            BookingOutcome::Failed => "Unable to create booking. Please try again or call the salon.",
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, BookingOutcome::Confirmed { .. })
    }
}

/// First 6 hex chars of SHA-256(booking_id), uppercased.
pub fn confirmation_code(booking_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(booking_id.as_bytes()));
    digest[..6].to_ascii_uppercase()
}

pub struct BookingCoordinator {
    backend: Arc<dyn BookingBackend>,
    lock: DistributedLock,
    outbound: Arc<RateLimiter>,
    lock_ttl: Duration,
}

impl BookingCoordinator {
    pub fn new(
        backend: Arc<dyn BookingBackend>,
        lock: DistributedLock,
        outbound: Arc<RateLimiter>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            lock,
            outbound,
            lock_ttl,
        }
    }

    /// Outbound limit from `rate_limit.outbound`, lock TTL from
    /// `locks.default_ttl_secs`.
    pub fn from_config(
        backend: Arc<dyn BookingBackend>,
        locks: Arc<dyn LockStore>,
        config: &GatewayConfig,
    ) -> Self {
        Self::new(
            backend,
            DistributedLock::new(locks),
            Arc::new(RateLimiter::from_config(&config.rate_limit.outbound)),
            Duration::from_secs(config.locks.default_ttl_secs),
        )
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    pub async fn book(&self, request: &BookingRequest) -> BookingOutcome {
        if !self.outbound.try_acquire(OUTBOUND_LIMIT_KEY) {
            metrics::record_rate_limited("outbound");
            return BookingOutcome::Throttled;
        }

        let key = request.lock_key();
        let token = match self.lock.acquire(&key, self.lock_ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => return BookingOutcome::SlotBusy,
            Err(e) => {
                // Treated as contention: the customer is asked to retry.
                tracing::error!(key = %key, error = %e, "Lock acquisition failed");
                return BookingOutcome::SlotBusy;
            }
        };

        let outcome = self.book_locked(request).await;
        self.release(&key, &token).await;
        outcome
    }

    async fn book_locked(&self, request: &BookingRequest) -> BookingOutcome {
        match self.backend.is_slot_available(request).await {
            Ok(true) => {}
            Ok(false) => return BookingOutcome::SlotTaken,
            Err(e) => {
                tracing::error!(stylist_id = %request.stylist_id, error = %e, "Availability check failed");
                return BookingOutcome::Failed;
            }
        }

        match self.backend.create_booking(request).await {
            Ok(booking_id) => {
                let confirmation_code = confirmation_code(&booking_id);
                tracing::info!(booking_id = %booking_id, stylist_id = %request.stylist_id, "Booking created");
                BookingOutcome::Confirmed {
                    booking_id,
                    confirmation_code,
                }
            }
            Err(e) => {
                tracing::error!(stylist_id = %request.stylist_id, error = %e, "Booking creation failed");
                BookingOutcome::Failed
            }
        }
    }

    async fn release(&self, key: &str, token: &LockToken) {
        // A failed release is bounded by the TTL.
        if let Err(e) = self.lock.release(key, token).await {
            tracing::error!(key = %key, error = %e, "Lock release failed");
        }
    }
}

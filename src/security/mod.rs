//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming webhook:
//!     → rate_limit.rs (per-IP token bucket)
//!     → webhook/signature.rs, webhook/freshness.rs
//!     → replay.rs (fingerprint dedup)
//!     → Pass to payload validation
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input, including forwarding headers unless configured

pub mod rate_limit;
pub mod replay;

pub use rate_limit::RateLimiter;
pub use replay::{ReplayGuard, RequestFingerprint};

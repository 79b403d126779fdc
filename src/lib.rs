//! Webhook security and idempotency gateway.
//!
//! Verifies provider signatures (WhatsApp, Square, Stripe), enforces
//! timestamp freshness, per-IP rate limits and replay protection, then hands
//! each accepted webhook to a `WebhookSink` exactly once. Also provides the
//! best-effort distributed lock used by the booking flow.

// Core subsystems
pub mod config;
pub mod http;
pub mod store;
pub mod webhook;

// Coordination
pub mod lock;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use lock::BookingCoordinator;
pub use store::Stores;

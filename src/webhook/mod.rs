//! Webhook acceptance.
//!
//! # Data Flow
//! ```text
//! http/server.rs builds a WebhookRequest
//!     → pipeline.rs
//!         → security/rate_limit.rs
//!         → signature.rs   (per-provider HMAC scheme)
//!         → freshness.rs   (timestamp window)
//!         → security/replay.rs
//!         → payload.rs     (shape check → ProviderEvent)
//!     → sink.rs (business collaborator)
//! ```

pub mod freshness;
pub mod payload;
pub mod pipeline;
pub mod reject;
pub mod request;
pub mod signature;
pub mod sink;
pub mod stats;

pub use payload::{ProviderEvent, PayloadError};
pub use pipeline::{Acceptance, Rejection, Stage, WebhookPipeline};
pub use reject::RejectReason;
pub use request::{Provider, WebhookRequest};
pub use signature::{ProviderSecrets, SigningSecret};
pub use sink::{AcceptedWebhook, ChannelSink, LogSink, SinkError, WebhookSink};
pub use stats::{PipelineStats, StatsSnapshot};

//! The webhook acceptance state machine.
//!
//! ```text
//! RECEIVED → RATE_CHECKED → SIGNATURE_CHECKED → TIMESTAMP_CHECKED
//!          → DEDUP_CHECKED → PAYLOAD_VALIDATED → ACCEPTED
//!                     └──── any failure ────▶ REJECTED(reason)
//! ```
//!
//! Checks run strictly in order and stop at the first failure. The dedup
//! stage claims the fingerprint atomically, so two concurrent copies of one
//! delivery cannot both reach the sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::security::{RateLimiter, ReplayGuard, RequestFingerprint};
use crate::store::ReplayStore;
use crate::webhook::freshness::{extract_timestamp, is_fresh};
use crate::webhook::payload::validate_payload;
use crate::webhook::reject::RejectReason;
use crate::webhook::request::{Provider, WebhookRequest};
use crate::webhook::signature::{self, ProviderSecrets};
use crate::webhook::sink::{AcceptedWebhook, WebhookSink};
use crate::webhook::stats::PipelineStats;

/// The check a request was at when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RateLimit,
    Signature,
    Timestamp,
    Dedup,
    Payload,
    Delivery,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RateLimit => "rate_limit",
            Stage::Signature => "signature",
            Stage::Timestamp => "timestamp",
            Stage::Dedup => "dedup",
            Stage::Payload => "payload",
            Stage::Delivery => "delivery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub stage: Stage,
    pub reason: RejectReason,
}

impl Rejection {
    fn at(stage: Stage, reason: RejectReason) -> Self {
        Self { stage, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub provider: Provider,
    pub fingerprint: RequestFingerprint,
}

/// Runs every inbound webhook through the security checks.
pub struct WebhookPipeline {
    limiter: Arc<RateLimiter>,
    rate_limit_enabled: bool,
    secrets: ArcSwap<ProviderSecrets>,
    freshness_window: Duration,
    replay: ReplayGuard,
    fail_open: bool,
    sink: Arc<dyn WebhookSink>,
    stats: PipelineStats,
}

impl WebhookPipeline {
    pub fn new(
        config: &GatewayConfig,
        replay_store: Arc<dyn ReplayStore>,
        sink: Arc<dyn WebhookSink>,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit.inbound)),
            rate_limit_enabled: config.rate_limit.enabled,
            secrets: ArcSwap::from_pointee(ProviderSecrets::from_config(&config.providers)),
            freshness_window: Duration::from_secs(config.freshness.window_secs),
            replay: ReplayGuard::new(replay_store, Duration::from_secs(config.replay.window_secs)),
            fail_open: config.replay.fail_open,
            sink,
            stats: PipelineStats::new(),
        }
    }

    /// Swap signing secrets without interrupting in-flight requests.
    pub fn update_secrets(&self, secrets: ProviderSecrets) {
        self.secrets.store(Arc::new(secrets));
    }

    pub fn configured_providers(&self) -> Vec<Provider> {
        self.secrets.load().configured()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn replay(&self) -> &ReplayGuard {
        &self.replay
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub async fn process(&self, request: WebhookRequest) -> Result<Acceptance, Rejection> {
        let start = Instant::now();
        let provider = request.provider();

        let result = self.run_checks(request).await;

        match &result {
            Ok(_) => {
                self.stats.record_accepted();
                metrics::record_webhook(provider.as_str(), "accepted", start);
            }
            Err(rejection) => {
                self.stats.record_rejected(rejection.reason);
                metrics::record_rejection(rejection.reason.code());
                metrics::record_webhook(provider.as_str(), "rejected", start);
            }
        }
        result
    }

    async fn run_checks(&self, request: WebhookRequest) -> Result<Acceptance, Rejection> {
        let provider = request.provider();

        // RECEIVED → RATE_CHECKED
        if self.rate_limit_enabled && !self.limiter.try_acquire(request.client_ip()) {
            metrics::record_rate_limited("inbound");
            tracing::info!(client_ip = %request.client_ip(), provider = %provider, "Rate limit exceeded");
            return Err(Rejection::at(Stage::RateLimit, RejectReason::RateLimited));
        }

        // RATE_CHECKED → SIGNATURE_CHECKED
        let verified = {
            let secrets = self.secrets.load();
            match secrets.get(provider) {
                Some(secret) => signature::verify(provider, request.raw_body(), request.headers(), secret),
                None => {
                    tracing::warn!(provider = %provider, "No signing secret configured for provider");
                    false
                }
            }
        };
        if !verified {
            tracing::warn!(
                client_ip = %request.client_ip(),
                provider = %provider,
                body_hash = %body_hash_prefix(request.raw_body()),
                "Invalid webhook signature"
            );
            return Err(Rejection::at(Stage::Signature, RejectReason::InvalidSignature));
        }

        // SIGNATURE_CHECKED → TIMESTAMP_CHECKED
        let timestamp = match extract_timestamp(&request) {
            Some(ts) if is_fresh(ts, request.received_at_unix(), self.freshness_window) => ts,
            Some(ts) => {
                tracing::info!(
                    provider = %provider,
                    timestamp = ts,
                    skew_secs = request.received_at_unix().abs_diff(ts),
                    "Webhook timestamp outside freshness window"
                );
                return Err(Rejection::at(Stage::Timestamp, RejectReason::StaleTimestamp));
            }
            None => {
                tracing::info!(provider = %provider, "Webhook carries no usable timestamp");
                return Err(Rejection::at(Stage::Timestamp, RejectReason::StaleTimestamp));
            }
        };

        // TIMESTAMP_CHECKED → DEDUP_CHECKED
        let fingerprint = RequestFingerprint::derive(timestamp, request.raw_body());
        let claimed = match self.replay.check_and_remember(&fingerprint).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(
                    client_ip = %request.client_ip(),
                    provider = %provider,
                    fingerprint = %fingerprint.short(),
                    "Duplicate webhook rejected"
                );
                return Err(Rejection::at(Stage::Dedup, RejectReason::DuplicateRequest));
            }
            Err(e) if self.fail_open => {
                tracing::error!(
                    provider = %provider,
                    fingerprint = %fingerprint.short(),
                    error = %e,
                    "Replay store unavailable, accepting without dedup (fail_open)"
                );
                false
            }
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "Replay store unavailable");
                return Err(Rejection::at(Stage::Dedup, RejectReason::InternalError));
            }
        };
        if let Some(count) = self.replay.len_hint() {
            metrics::record_replay_entries(count);
        }

        // DEDUP_CHECKED → PAYLOAD_VALIDATED
        let event = match validate_payload(provider, request.raw_body()) {
            Ok(event) => event,
            Err(e) => {
                tracing::info!(provider = %provider, fingerprint = %fingerprint.short(), error = %e, "Malformed webhook payload");
                return Err(Rejection::at(Stage::Payload, RejectReason::MalformedPayload));
            }
        };

        // PAYLOAD_VALIDATED → ACCEPTED
        let accepted = AcceptedWebhook {
            provider,
            fingerprint: fingerprint.clone(),
            client_ip: request.client_ip().to_string(),
            received_at: request.received_at_time(),
            event,
            raw_body: request.raw_body().clone(),
        };
        if let Err(e) = self.sink.deliver(accepted).await {
            tracing::error!(provider = %provider, fingerprint = %fingerprint.short(), error = %e, "Webhook delivery failed");
            if claimed {
                if let Err(e) = self.replay.forget(&fingerprint).await {
                    tracing::error!(fingerprint = %fingerprint.short(), error = %e, "Failed to release replay claim");
                }
            }
            return Err(Rejection::at(Stage::Delivery, RejectReason::InternalError));
        }

        Ok(Acceptance { provider, fingerprint })
    }
}

/// First 12 hex chars of the body hash, for correlating rejected requests.
fn body_hash_prefix(body: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(body));
    digest[..12].to_string()
}

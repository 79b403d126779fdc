//! Hand-off of accepted webhooks to business logic.

use std::time::SystemTime;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::mpsc;

use crate::security::RequestFingerprint;
use crate::webhook::payload::ProviderEvent;
use crate::webhook::request::Provider;

/// A webhook that passed every check.
#[derive(Debug, Clone)]
pub struct AcceptedWebhook {
    pub provider: Provider,
    pub fingerprint: RequestFingerprint,
    pub client_ip: String,
    pub received_at: SystemTime,
    pub event: ProviderEvent,
    pub raw_body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,

    #[error("handler failed: {0}")]
    Handler(String),
}

/// Receives each accepted webhook exactly once.
///
/// An error releases the replay claim so the provider's retry is processed.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, webhook: AcceptedWebhook) -> Result<(), SinkError>;
}

/// Logs accepted webhooks and drops them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl WebhookSink for LogSink {
    async fn deliver(&self, webhook: AcceptedWebhook) -> Result<(), SinkError> {
        tracing::info!(
            provider = %webhook.provider,
            fingerprint = %webhook.fingerprint.short(),
            event = %webhook.event.summary(),
            "Webhook accepted"
        );
        Ok(())
    }
}

/// Forwards accepted webhooks over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AcceptedWebhook>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<AcceptedWebhook>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WebhookSink for ChannelSink {
    async fn deliver(&self, webhook: AcceptedWebhook) -> Result<(), SinkError> {
        self.tx.send(webhook).await.map_err(|_| SinkError::Closed)
    }
}

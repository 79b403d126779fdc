//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use webhook_guard::config::{GatewayConfig, ProviderSecretConfig};
use webhook_guard::http::AppState;
use webhook_guard::webhook::request::unix_secs;
use webhook_guard::webhook::{AcceptedWebhook, ChannelSink};
use webhook_guard::{HttpServer, Shutdown, Stores};

pub const SQUARE_KEY: &str = "sq-integration-key";
pub const SQUARE_URL: &str = "https://salon.example/webhooks/square";
pub const STRIPE_KEY: &str = "whsec_integration";
pub const WHATSAPP_KEY: &str = "wa-integration-secret";
pub const ADMIN_KEY: &str = "integration-admin-key";

/// All three providers configured, admin key set.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config.admin.api_key = ADMIN_KEY.into();
    config.providers.square = Some(ProviderSecretConfig {
        secret: Some(SQUARE_KEY.into()),
        notification_url: Some(SQUARE_URL.into()),
        ..Default::default()
    });
    config.providers.stripe = Some(ProviderSecretConfig {
        secret: Some(STRIPE_KEY.into()),
        ..Default::default()
    });
    config.providers.whatsapp = Some(ProviderSecretConfig {
        secret: Some(WHATSAPP_KEY.into()),
        ..Default::default()
    });
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub accepted: mpsc::Receiver<AcceptedWebhook>,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Boot the real server on an ephemeral port with a channel sink.
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let (sink, accepted) = ChannelSink::new(64);
    let stores = Stores::in_memory(config.replay.max_entries);
    let server = HttpServer::with_components(config, stores, Arc::new(sink));
    let state = server.state().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_tx, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestGateway {
        addr,
        accepted,
        state,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn now() -> i64 {
    unix_secs(SystemTime::now())
}

//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Bind server to listener and serve until shutdown
//! - Spawn the admin listener, maintenance task and config reload loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::GatewayConfig;
use crate::http::request::{client_ip, request_id};
use crate::http::response;
use crate::lifecycle::Maintenance;
use crate::lock::DistributedLock;
use crate::store::Stores;
use crate::webhook::{LogSink, Provider, ProviderSecrets, WebhookPipeline, WebhookRequest, WebhookSink};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<WebhookPipeline>,
    pub locks: DistributedLock,
    /// Latest loaded configuration. Only secrets and the admin key take
    /// effect on reload.
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub started_at: Instant,
}

/// HTTP server for the webhook gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl HttpServer {
    /// In-memory stores, accepted webhooks are logged.
    pub fn new(config: GatewayConfig) -> Self {
        let stores = Stores::in_memory(config.replay.max_entries);
        Self::with_components(config, stores, Arc::new(LogSink))
    }

    pub fn with_components(config: GatewayConfig, stores: Stores, sink: Arc<dyn WebhookSink>) -> Self {
        let pipeline = Arc::new(WebhookPipeline::new(&config, stores.replay.clone(), sink));
        let state = AppState {
            pipeline,
            locks: DistributedLock::new(stores.locks),
            config: Arc::new(ArcSwap::from_pointee(config.clone())),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&config, state.clone());
        Self { router, state, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/webhooks/{provider}", post(webhook_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            providers = ?self.state.pipeline.configured_providers(),
            "HTTP server starting"
        );

        let maintenance = Maintenance::new(
            self.state.pipeline.clone(),
            self.state.locks.clone(),
            Duration::from_secs(self.config.maintenance.interval_secs),
            Duration::from_secs(self.config.rate_limit.idle_secs),
        );
        tokio::spawn(maintenance.run(shutdown.resubscribe()));

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let state = self.state.clone();
            let admin_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                if let Err(e) = admin::serve(admin_listener, state, admin_shutdown).await {
                    tracing::error!(error = %e, "Admin server failed");
                }
            });
        }

        let pipeline = self.state.pipeline.clone();
        let shared = self.state.config.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                pipeline.update_secrets(ProviderSecrets::from_config(&new_config.providers));
                shared.store(Arc::new(new_config));
                tracing::info!(providers = ?pipeline.configured_providers(), "Configuration reloaded");
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn webhook_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = provider.parse::<Provider>() else {
        tracing::debug!(provider = %provider, "Webhook for unknown provider");
        return response::unknown_provider();
    };

    let trust_proxy = state.config.load().security.trust_proxy_headers;
    let ip = client_ip(&headers, peer, trust_proxy);
    let request_id = request_id(&headers).to_string();
    let request = WebhookRequest::new(provider, body, headers, ip);

    match state.pipeline.process(request).await {
        Ok(acceptance) => {
            tracing::debug!(request_id = %request_id, provider = %provider, "Webhook accepted");
            acceptance.into_response()
        }
        Err(rejection) => {
            tracing::debug!(
                request_id = %request_id,
                provider = %provider,
                stage = rejection.stage.as_str(),
                reason = rejection.reason.code(),
                "Webhook rejected"
            );
            rejection.reason.into_response()
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

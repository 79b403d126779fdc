use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::StoreBackend;
use crate::http::server::AppState;
use crate::webhook::{Provider, StatsSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub providers: Vec<Provider>,
    pub store: StoreBackend,
}

#[derive(Serialize)]
pub struct GatewayStats {
    #[serde(flatten)]
    pub webhooks: StatsSnapshot,
    /// `None` when the store cannot report it (Redis).
    pub replay_entries: Option<usize>,
    pub rate_buckets: usize,
    pub held_locks: Option<usize>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        providers: state.pipeline.configured_providers(),
        store: state.config.load().store.backend,
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<GatewayStats> {
    Json(GatewayStats {
        webhooks: state.pipeline.stats().snapshot(),
        replay_entries: state.pipeline.replay().len_hint(),
        rate_buckets: state.pipeline.limiter().bucket_count(),
        held_locks: state.locks.held_hint(),
    })
}

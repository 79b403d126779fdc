//! webhook-guard
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  WEBHOOK GUARD                    │
//!   Provider POST        │  ┌──────┐  ┌───────────┐  ┌──────────┐           │
//!   /webhooks/{p} ───────┼─▶│ http │─▶│ rate limit│─▶│signature │           │
//!                        │  └──────┘  └───────────┘  └────┬─────┘           │
//!                        │                                 ▼                 │
//!                        │  ┌────────┐  ┌──────────┐  ┌──────────┐          │
//!   200 / 4xx / 500 ◀────┼──│response│◀─│ payload  │◀─│freshness │          │
//!                        │  └────────┘  └────┬─────┘  │ + replay │          │
//!                        │                   ▼        └──────────┘          │
//!                        │              WebhookSink                          │
//!                        │                                                   │
//!                        │  stores (memory | redis)   admin API   metrics    │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use webhook_guard::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use webhook_guard::lifecycle::{signals, Shutdown};
use webhook_guard::observability::{logging, metrics};
use webhook_guard::webhook::LogSink;
use webhook_guard::{HttpServer, Stores};

#[derive(Parser)]
#[command(name = "webhook-guard", version, about = "Webhook signature, replay and rate-limit gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload provider secrets when the config file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("webhook-guard v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        store = ?config.store.backend,
        request_timeout_secs = config.timeouts.request_secs,
        replay_window_secs = config.replay.window_secs,
        freshness_window_secs = config.freshness.window_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let stores = Stores::from_config(&config.store, &config.replay).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        _ => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let server = HttpServer::with_components(config, stores, Arc::new(LogSink));
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

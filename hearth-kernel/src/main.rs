/**
 * HEARTH KERNEL - Entry point of the clock server
 *
 * ROLE : Wires config, sources, poller, MQTT publisher and HTTP API.
 *
 * ARCHITECTURE : poll loop -> immutable Snapshot -> SnapshotStore -> REST/SVG + MQTT.
 * The aggregation core never fails a cycle; only an invalid config or an
 * unbindable listener stops the process.
 */

mod aggregator;
mod config;
mod health;
mod http;
mod layout;
mod models;
mod mqtt;
mod poller;
mod snapshot;
mod source;
mod state;
mod svg;

use crate::aggregator::Aggregator;
use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::poller::Poller;
use crate::source::home_assistant::HomeAssistantConnector;
use crate::source::mock::{demo_sources, MockConnector};
use crate::source::SourceConnector;
use crate::state::SnapshotStore;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hearth_kernel=info")),
        )
        .init();

    let cfg = load_config().await.context("failed to load config")?;

    let (connector, sources) = if cfg.mock {
        info!("mock mode: serving demo household");
        let connector: Arc<dyn SourceConnector> = Arc::new(MockConnector::demo());
        (connector, demo_sources())
    } else {
        let connector: Arc<dyn SourceConnector> = Arc::new(
            HomeAssistantConnector::new(cfg.request_timeout())
                .context("failed to build Home Assistant client")?,
        );
        (connector, cfg.sources())
    };
    if sources.is_empty() {
        warn!("no sources configured, the clock will stay empty");
    }
    let subjects_tracked: usize = sources.values().map(|people| people.len()).sum();
    let sources = Arc::new(sources);

    let store = SnapshotStore::new();
    let health_tracker = HealthTracker::new(cfg.mqtt.is_some());

    if let Some(mqtt_conf) = cfg.mqtt.clone() {
        mqtt::spawn_snapshot_publisher(mqtt_conf, store.subscribe(), health_tracker.clone());
    }

    let poller = Poller::new(
        Aggregator::new(connector),
        sources.clone(),
        store.clone(),
        health_tracker.clone(),
    );
    let poll_task = poller.spawn(cfg.poll_interval());

    let app_state = AppState {
        store,
        health_tracker,
        band: cfg.layout,
        api_key: std::env::var("HEARTH_API_KEY").ok(),
        sources_tracked: sources.len(),
        subjects_tracked,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!("listening on http://{}", cfg.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
        .context("HTTP server failed")?;

    poll_task.abort();
    Ok(())
}

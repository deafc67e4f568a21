//! HTTP health endpoint: `GET /health` returns worker status and counters as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::worker::WorkerStats;

#[derive(Clone)]
struct HealthState {
    topic: Arc<str>,
    stats: Arc<WorkerStats>,
}

pub fn router(topic: impl Into<Arc<str>>, stats: Arc<WorkerStats>) -> Router {
    let state = HealthState {
        topic: topic.into(),
        stats,
    };
    Router::new()
        .route("/health", get(health_http))
        .with_state(state)
}

/// Bind `addr` and serve the health router until `stop` turns true (or its sender is dropped).
///
/// Binding happens before this returns, so a taken port is a startup error.
pub async fn spawn_health(
    addr: &str,
    topic: String,
    stats: Arc<WorkerStats>,
    mut stop: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding health endpoint to {}", addr))?;
    log::info!("health endpoint listening on http://{}/health", addr);

    let app = router(topic, stats);
    Ok(tokio::spawn(async move {
        let shutdown = async move {
            while !*stop.borrow() {
                if stop.changed().await.is_err() {
                    break;
                }
            }
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            log::error!("health endpoint failed: {}", e);
        }
        log::debug!("health endpoint stopped");
    }))
}

async fn health_http(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let totals = state.stats.snapshot();
    Json(json!({
        "status": "ok",
        "topic": &*state.topic,
        "received": totals.received,
        "delivered": totals.delivered,
        "failed": totals.failed,
        "acknowledged": totals.acknowledged,
    }))
}

//! HTTP server for the Prometheus metrics endpoint and a feed status page.
//!
//! Runs on a separate tokio task and serves:
//! - `/metrics` for Prometheus scraping
//! - `/status` with the last relayed post id per faction, as JSON

use crate::state::LastSeenView;
use axum::extract::State;
use axum::{Json, Router, routing::get};
use std::net::SocketAddr;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Handler for GET /status.
async fn status_handler(State(last_seen): State<LastSeenView>) -> Json<serde_json::Value> {
    let feeds: serde_json::Map<String, serde_json::Value> = last_seen
        .snapshot()
        .into_iter()
        .map(|(faction, id)| (faction.to_string(), serde_json::Value::from(id)))
        .collect();
    Json(serde_json::json!({ "last_seen": feeds }))
}

fn router(last_seen: LastSeenView) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(last_seen)
}

/// Run the HTTP server.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16, last_seen: LastSeenView) {
    let app = router(last_seen);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}

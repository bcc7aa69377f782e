//! Minimal `prometheus_client`-style text exposition over HTTP, the Rust
//! equivalent of `prometheus_client.start_http_server`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};

use crate::gauges::TeuthologyMetrics;

async fn metrics_handler(State(metrics): State<Arc<TeuthologyMetrics>>) -> Result<String, StatusCode> {
    let families = metrics.registry().gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buf).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn router(metrics: Arc<TeuthologyMetrics>) -> Router {
    Router::new().route("/metrics", get(metrics_handler)).with_state(metrics)
}

/// Binds `port` on all interfaces and serves `/metrics` until the listener
/// is dropped or the process is killed.
pub async fn serve(metrics: Arc<TeuthologyMetrics>, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "teuthology-exporter listening");
    axum::serve(listener, router(metrics)).await
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

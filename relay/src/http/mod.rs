//! HTTP endpoints for cipher-relay.
//!
//! Provides the WebSocket upgrade endpoint plus health and metrics.

pub mod health;
mod metrics;

use crate::server::Relay;
use crate::session;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// The fixed connection endpoint. Not user-configurable.
pub const WS_ROUTE: &str = "/ws";

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route(WS_ROUTE, get(ws_handler))
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(relay))
}

/// GET /ws
///
/// Upgrades the connection and hands it to a session task. One connection
/// per client session.
async fn ws_handler(ws: WebSocketUpgrade, Extension(relay): Extension<Arc<Relay>>) -> Response {
    ws.on_upgrade(move |socket| session::run(relay, socket))
}

//! Prometheus metrics endpoint.

use crate::server::Relay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<Relay>>) -> impl IntoResponse {
    let m = relay.metrics();

    // Gauges — current state
    let connections = relay.active_connections();
    let queued = relay.store().queued_total().await.unwrap_or(0);

    // Counters — monotonic since startup
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let handshake_failures = m.handshake_failures.load(Ordering::Relaxed);
    let delivered_live = m.delivered_live.load(Ordering::Relaxed);
    let queued_offline = m.queued_offline.load(Ordering::Relaxed);
    let replayed = m.replayed_total.load(Ordering::Relaxed);
    let dropped_writes = m.dropped_writes.load(Ordering::Relaxed);
    let store_failures = m.store_failures.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP cipher_relay_connections_active Number of live connections
# TYPE cipher_relay_connections_active gauge
cipher_relay_connections_active {connections}

# HELP cipher_relay_queued_messages Messages currently queued for offline users
# TYPE cipher_relay_queued_messages gauge
cipher_relay_queued_messages {queued}

# HELP cipher_relay_info Server information
# TYPE cipher_relay_info gauge
cipher_relay_info{{version="{version}"}} 1

# HELP cipher_relay_connections_total Total connections accepted
# TYPE cipher_relay_connections_total counter
cipher_relay_connections_total {conns_total}

# HELP cipher_relay_handshake_failures_total Connections dropped during handshake
# TYPE cipher_relay_handshake_failures_total counter
cipher_relay_handshake_failures_total {handshake_failures}

# HELP cipher_relay_delivered_live_total Messages written to a live connection
# TYPE cipher_relay_delivered_live_total counter
cipher_relay_delivered_live_total {delivered_live}

# HELP cipher_relay_queued_offline_total Messages appended to an offline queue
# TYPE cipher_relay_queued_offline_total counter
cipher_relay_queued_offline_total {queued_offline}

# HELP cipher_relay_replayed_total Queued messages replayed on reconnect
# TYPE cipher_relay_replayed_total counter
cipher_relay_replayed_total {replayed}

# HELP cipher_relay_dropped_writes_total Messages dropped after the recipient vanished
# TYPE cipher_relay_dropped_writes_total counter
cipher_relay_dropped_writes_total {dropped_writes}

# HELP cipher_relay_store_failures_total Offline store failures
# TYPE cipher_relay_store_failures_total counter
cipher_relay_store_failures_total {store_failures}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

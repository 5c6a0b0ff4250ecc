//! Shared relay state.
//!
//! [`Relay`] owns the connection registry, the offline store handle, the
//! sending side of the dispatch channel, and the operational metrics. One
//! instance is shared (via `Arc`) by every connection task, the dispatcher,
//! and the HTTP endpoints.

use crate::config::Config;
use crate::error::SessionError;
use crate::registry::ConnectionRegistry;
use crate::store::OfflineStore;
use relay_types::Message;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64` — no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total connections accepted (before handshake).
    pub connections_total: AtomicU64,
    /// Total connections dropped during handshake (malformed, missing, late).
    pub handshake_failures: AtomicU64,
    /// Total messages written to a live recipient connection.
    pub delivered_live: AtomicU64,
    /// Total messages appended to an offline queue.
    pub queued_offline: AtomicU64,
    /// Total queued messages replayed on reconnect.
    pub replayed_total: AtomicU64,
    /// Total messages dropped because the recipient vanished between
    /// lookup and write.
    pub dropped_writes: AtomicU64,
    /// Total offline store failures (enqueue or drain).
    pub store_failures: AtomicU64,
}

/// Shared state for the relay.
pub struct Relay {
    config: Config,
    registry: ConnectionRegistry,
    store: Arc<dyn OfflineStore>,
    dispatch_tx: mpsc::Sender<Message>,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Create the relay state and the receiving end of its dispatch channel.
    ///
    /// The caller hands the receiver to a single
    /// [`Dispatcher`](crate::dispatch::Dispatcher); that task is the only
    /// consumer, which is what serializes routing decisions.
    pub fn new(config: Config, store: Arc<dyn OfflineStore>) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let capacity = config.dispatch.queue_capacity.max(1);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(capacity);

        let relay = Arc::new(Self {
            config,
            registry: ConnectionRegistry::new(),
            store,
            dispatch_tx,
            metrics: RelayMetrics::default(),
        });

        (relay, dispatch_rx)
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the live connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Get the offline store.
    pub fn store(&self) -> &dyn OfflineStore {
        self.store.as_ref()
    }

    /// Get the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Number of currently registered live connections.
    pub fn active_connections(&self) -> usize {
        self.registry.len()
    }

    /// Hand an inbound message to the dispatcher.
    ///
    /// Awaits when the dispatch channel is full, which stalls the calling
    /// read loop until the dispatcher catches up.
    pub async fn dispatch(&self, message: Message) -> Result<(), SessionError> {
        self.dispatch_tx
            .send(message)
            .await
            .map_err(|_| SessionError::DispatchClosed)
    }
}

//! The message dispatcher.
//!
//! A single task consumes every inbound message from every connection and,
//! per message, either writes it to the recipient's live connection or
//! appends it to the recipient's offline queue. Being the sole consumer of
//! the dispatch channel is what serializes these decisions: no two routing
//! attempts for the same recipient ever race each other.

use crate::server::Relay;
use relay_types::Message;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The single serialized routing task.
pub struct Dispatcher {
    relay: Arc<Relay>,
    rx: mpsc::Receiver<Message>,
}

impl Dispatcher {
    /// Create a dispatcher consuming the given channel.
    pub fn new(relay: Arc<Relay>, rx: mpsc::Receiver<Message>) -> Self {
        Self { relay, rx }
    }

    /// Consume messages until every sender is gone — in practice, for the
    /// life of the process, since [`Relay`] holds a sender.
    pub async fn run(mut self) {
        tracing::info!("dispatcher started");
        while let Some(message) = self.rx.recv().await {
            self.route(message).await;
        }
        tracing::info!("dispatcher stopped");
    }

    /// Route one message: live write if the recipient is connected,
    /// offline enqueue otherwise.
    ///
    /// Lookup and write are not atomic with registry mutation; a recipient
    /// that disconnects in between counts as a dropped write, not as
    /// offline. Neither failure path retries — delivery is best-effort.
    async fn route(&self, message: Message) {
        let metrics = self.relay.metrics();
        let recipient = message.recipient_id.clone();

        match self.relay.registry().lookup(&recipient) {
            Some(conn) => {
                if conn.send(message).is_ok() {
                    metrics.delivered_live.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(user = %recipient, "delivered to live connection");
                } else {
                    metrics.dropped_writes.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        user = %recipient,
                        "recipient disconnected between lookup and write; message dropped"
                    );
                }
            }
            None => match self.relay.store().enqueue(&recipient, &message).await {
                Ok(()) => {
                    metrics.queued_offline.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(user = %recipient, "recipient offline; message queued");
                }
                Err(e) => {
                    metrics.store_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        user = %recipient,
                        error = %e,
                        "offline enqueue failed; message lost"
                    );
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{StoreError, StoreResult};
    use crate::registry::ConnectionHandle;
    use crate::store::{MemoryStore, OfflineStore};
    use async_trait::async_trait;
    use relay_types::UserId;

    /// Store whose every operation fails, standing in for an unreachable
    /// external service.
    struct UnreachableStore;

    #[async_trait]
    impl OfflineStore for UnreachableStore {
        async fn enqueue(&self, _user_id: &UserId, _message: &Message) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn drain(&self, _user_id: &UserId) -> StoreResult<Vec<Message>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn queued_total(&self) -> StoreResult<u64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn message(to: &str, from: &str, content: &str) -> Message {
        Message {
            recipient_id: user(to),
            sender_id: user(from),
            encrypted_content: content.to_string(),
        }
    }

    fn dispatcher_with_store(
        store: Arc<dyn OfflineStore>,
    ) -> (Arc<Relay>, Dispatcher) {
        let (relay, rx) = Relay::new(Config::default(), store);
        let dispatcher = Dispatcher::new(relay.clone(), rx);
        (relay, dispatcher)
    }

    #[tokio::test]
    async fn live_recipient_gets_the_message_directly() {
        let store = Arc::new(MemoryStore::new());
        let (relay, dispatcher) = dispatcher_with_store(store.clone());

        let (conn, mut rx) = ConnectionHandle::channel();
        relay.registry().register(user("U2"), conn);

        dispatcher.route(message("U2", "U1", "abc")).await;

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.sender_id, user("U1"));
        assert_eq!(delivered.encrypted_content, "abc");
        // No store interaction for live delivery.
        assert_eq!(store.queued_total().await.unwrap(), 0);
        assert_eq!(
            relay.metrics().delivered_live.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn offline_recipient_message_is_queued() {
        let store = Arc::new(MemoryStore::new());
        let (relay, dispatcher) = dispatcher_with_store(store.clone());

        dispatcher.route(message("U2", "U1", "abc")).await;

        let queued = store.drain(&user("U2")).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].encrypted_content, "abc");
        assert_eq!(relay.metrics().queued_offline.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn vanished_recipient_drops_without_offline_fallback() {
        let store = Arc::new(MemoryStore::new());
        let (relay, dispatcher) = dispatcher_with_store(store.clone());

        let (conn, rx) = ConnectionHandle::channel();
        relay.registry().register(user("U2"), conn);
        // Recipient goes away after registration but its entry lingers.
        drop(rx);

        dispatcher.route(message("U2", "U1", "abc")).await;

        assert_eq!(relay.metrics().dropped_writes.load(Ordering::Relaxed), 1);
        // Dropped, not queued: there is no offline fallback for a failed
        // live write.
        assert_eq!(store.queued_total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_store_loses_message_but_keeps_dispatching() {
        let (relay, dispatcher) = dispatcher_with_store(Arc::new(UnreachableStore));

        dispatcher.route(message("U3", "U1", "lost")).await;
        assert_eq!(relay.metrics().store_failures.load(Ordering::Relaxed), 1);

        // A later message to a live recipient still flows.
        let (conn, mut rx) = ConnectionHandle::channel();
        relay.registry().register(user("U2"), conn);
        dispatcher.route(message("U2", "U1", "still works")).await;
        assert_eq!(rx.try_recv().unwrap().encrypted_content, "still works");
    }

    #[tokio::test]
    async fn run_processes_messages_in_hand_off_order() {
        let store = Arc::new(MemoryStore::new());
        let (relay, rx) = Relay::new(Config::default(), store.clone());
        let task = tokio::spawn(Dispatcher::new(relay.clone(), rx).run());

        relay.dispatch(message("U2", "U1", "one")).await.unwrap();
        relay.dispatch(message("U2", "U1", "two")).await.unwrap();

        // The dispatcher task runs forever; wait for it to catch up.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while store.queued_total().await.unwrap() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "dispatcher stalled");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        task.abort();

        let queued = store.drain(&user("U2")).await.unwrap();
        let contents: Vec<_> = queued.iter().map(|m| m.encrypted_content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
    }
}

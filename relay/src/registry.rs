//! Live connection registry.
//!
//! Maps a user id to the outbound handle of its single active connection.
//! The whole mapping is guarded by one reader/writer lock, held only for the
//! duration of the map access and never across I/O or `.await`.

use relay_types::{Message, UserId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;

/// The connection this handle referred to is gone.
#[derive(Debug, thiserror::Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// A cheap, clonable handle to one live connection's outbound queue.
///
/// The session's writer task owns the socket sink and drains this queue, so
/// every producer that holds a handle gets its writes serialized onto the
/// socket without any per-connection lock. The registry stores a clone of
/// the handle; it never owns the connection itself.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer task will drain.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for delivery on this connection.
    ///
    /// Fails only if the connection's writer has already gone away, which is
    /// the "recipient vanished between lookup and write" case.
    pub fn send(&self, message: Message) -> Result<(), ConnectionClosed> {
        self.tx.send(message).map_err(|_| ConnectionClosed)
    }

    /// Whether two handles refer to the same physical connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Registry of live connections, at most one per user id.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the mapping for `user_id`.
    ///
    /// A prior entry for the same user is replaced, not merged: the prior
    /// physical connection becomes unreachable via lookup but is not closed
    /// by the registry.
    pub fn register(&self, user_id: UserId, conn: ConnectionHandle) {
        self.register_with_backlog(user_id, conn, Vec::new());
    }

    /// Insert the mapping for `user_id` and queue `backlog` onto the new
    /// connection in one critical section.
    ///
    /// Holding the write lock across the pushes keeps any concurrent lookup
    /// from queueing a newer message ahead of the backlog: a routed message
    /// can only reach this connection through a lookup that completes after
    /// the backlog is already queued. The pushes are non-blocking channel
    /// sends, so the lock is still never held across I/O.
    ///
    /// Returns the number of backlog messages queued; a connection that is
    /// already gone drops the remainder.
    pub fn register_with_backlog(
        &self,
        user_id: UserId,
        conn: ConnectionHandle,
        backlog: Vec<Message>,
    ) -> usize {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = map.insert(user_id.clone(), conn.clone()).is_some();
        let mut queued = 0;
        for message in backlog {
            if conn.send(message).is_err() {
                break;
            }
            queued += 1;
        }
        if replaced {
            tracing::debug!(user = %user_id, queued, "replaced existing registration");
        } else {
            tracing::debug!(user = %user_id, queued, "registered connection");
        }
        queued
    }

    /// Remove the mapping for `user_id` if it still refers to `conn`.
    ///
    /// The identity check keeps an orphaned connection's teardown from
    /// removing the entry of the connection that replaced it. Returns
    /// whether an entry was removed.
    pub fn unregister(&self, user_id: &UserId, conn: &ConnectionHandle) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match map.get(user_id) {
            Some(current) if current.same_connection(conn) => {
                map.remove(user_id);
                tracing::debug!(user = %user_id, "unregistered connection");
                true
            }
            _ => false,
        }
    }

    /// Look up the live connection for `user_id`, if any.
    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    /// Number of currently registered connections.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .finish()
    }
}

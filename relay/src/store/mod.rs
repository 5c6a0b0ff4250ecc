//! Offline message store.
//!
//! A durable FIFO queue per user id: messages for recipients with no live
//! connection are appended here and replayed, in arrival order, when the
//! recipient next connects. Draining clears the queue in the same
//! transaction, so a backlog is replayed exactly once.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use async_trait::async_trait;
use relay_types::{Message, UserId};

/// A durable, per-user FIFO queue of undelivered messages.
///
/// Implementations must preserve, per user, the order in which `enqueue`
/// calls were issued by the dispatch task. Any store failure is surfaced as
/// a [`StoreError`](crate::error::StoreError); it is never treated as
/// "message delivered".
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Append a message to the tail of the user's queue.
    async fn enqueue(&self, user_id: &UserId, message: &Message) -> StoreResult<()>;

    /// Return and clear the user's full queue, oldest first.
    ///
    /// On failure the queue is left intact for a future attempt.
    async fn drain(&self, user_id: &UserId) -> StoreResult<Vec<Message>>;

    /// Total queued messages across all users. Observability only.
    async fn queued_total(&self) -> StoreResult<u64>;
}

//! In-memory offline store backend.

use super::OfflineStore;
use crate::error::StoreResult;
use async_trait::async_trait;
use relay_types::{Message, UserId};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Non-durable offline store backed by a mutexed map.
///
/// Queues do not survive a restart. Intended for tests and local
/// development; production deployments use [`SqliteStore`](super::SqliteStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<UserId, Vec<Message>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for MemoryStore {
    async fn enqueue(&self, user_id: &UserId, message: &Message) -> StoreResult<()> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn drain(&self, user_id: &UserId) -> StoreResult<Vec<Message>> {
        Ok(self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
            .unwrap_or_default())
    }

    async fn queued_total(&self) -> StoreResult<u64> {
        Ok(self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|q| q.len() as u64)
            .sum())
    }
}

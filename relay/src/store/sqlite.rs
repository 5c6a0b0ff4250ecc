//! SQLite offline store backend.

use super::OfflineStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use relay_types::{Message, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite-backed offline queue.
///
/// Uses WAL mode for concurrent reads/writes. Queue order is the rowid
/// assigned at insert, which is monotone per table, so FIFO order per user
/// holds across restarts.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) an offline store at the given path.
    ///
    /// The path must be valid UTF-8; anything else is rejected rather than
    /// silently opening some other database.
    pub async fn new(path: &Path) -> StoreResult<Self> {
        let path_str = path.to_str().ok_or_else(|| {
            StoreError::Unavailable(format!(
                "database path is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                body TEXT NOT NULL,
                queued_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_offline_user_seq ON offline_messages(user_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl OfflineStore for SqliteStore {
    async fn enqueue(&self, user_id: &UserId, message: &Message) -> StoreResult<()> {
        let body = message.to_json().map_err(|e| StoreError::Codec {
            user_id: user_id.to_string(),
            source: e,
        })?;

        sqlx::query("INSERT INTO offline_messages (user_id, body) VALUES (?1, ?2)")
            .bind(user_id.as_str())
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn drain(&self, user_id: &UserId) -> StoreResult<Vec<Message>> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM offline_messages WHERE user_id = ?1 ORDER BY seq ASC",
        )
        .bind(user_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        // Decode before deleting: a corrupt row aborts the drain with the
        // queue intact, instead of destroying the backlog.
        let messages = bodies
            .iter()
            .map(|body| {
                Message::from_json(body).map_err(|e| StoreError::Codec {
                    user_id: user_id.to_string(),
                    source: e,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        sqlx::query("DELETE FROM offline_messages WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;
        Ok(messages)
    }

    async fn queued_total(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn drain_returns_messages_in_enqueue_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let u2 = user("U2");

        for i in 0..5 {
            store
                .enqueue(&u2, &message("U2", "U1", &format!("msg-{i}")))
                .await
                .unwrap();
        }

        let drained = store.drain(&u2).await.unwrap();
        let contents: Vec<_> = drained.iter().map(|m| m.encrypted_content.as_str()).collect();
        assert_eq!(contents, ["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
    }

    #[tokio::test]
    async fn drain_clears_the_queue() {
        let store = SqliteStore::in_memory().await.unwrap();
        let u2 = user("U2");

        store.enqueue(&u2, &message("U2", "U1", "abc")).await.unwrap();
        assert_eq!(store.drain(&u2).await.unwrap().len(), 1);

        // A repeated reconnect must not replay the same backlog.
        assert!(store.drain(&u2).await.unwrap().is_empty());
        assert_eq!(store.queued_total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drain_of_empty_queue_is_empty() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.drain(&user("nobody")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queues_are_isolated_per_user() {
        let store = SqliteStore::in_memory().await.unwrap();

        store
            .enqueue(&user("U2"), &message("U2", "U1", "for U2"))
            .await
            .unwrap();
        store
            .enqueue(&user("U3"), &message("U3", "U1", "for U3"))
            .await
            .unwrap();

        let drained = store.drain(&user("U2")).await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].encrypted_content, "for U2");

        // U3's queue is untouched.
        assert_eq!(store.queued_total().await.unwrap(), 1);
        assert_eq!(store.drain(&user("U3")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn interleaved_senders_preserve_arrival_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let u3 = user("U3");

        // Enqueue calls issued in this order by the single dispatch task,
        // regardless of which sender's connection produced them.
        store.enqueue(&u3, &message("U3", "U1", "first")).await.unwrap();
        store.enqueue(&u3, &message("U3", "U2", "second")).await.unwrap();
        store.enqueue(&u3, &message("U3", "U1", "third")).await.unwrap();

        let drained = store.drain(&u3).await.unwrap();
        let contents: Vec<_> = drained.iter().map(|m| m.encrypted_content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn fields_survive_storage_unchanged() {
        let store = SqliteStore::in_memory().await.unwrap();
        let u2 = user("U2");
        let original = message("U2", "U1", "opaque ciphertext \"with quotes\"");

        store.enqueue(&u2, &original).await.unwrap();
        let drained = store.drain(&u2).await.unwrap();
        assert_eq!(drained, vec![original]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_path_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"relay-\xff.db"));
        assert!(matches!(
            SqliteStore::new(path).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_row_aborts_drain_and_keeps_queue() {
        let store = SqliteStore::in_memory().await.unwrap();
        let u2 = user("U2");

        store.enqueue(&u2, &message("U2", "U1", "good")).await.unwrap();
        sqlx::query("INSERT INTO offline_messages (user_id, body) VALUES ('U2', 'not json')")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(matches!(
            store.drain(&u2).await,
            Err(StoreError::Codec { .. })
        ));
        // Nothing was deleted.
        assert_eq!(store.queued_total().await.unwrap(), 2);
    }
}

//! Conversation memory storage using SQLite
//!
//! Messages are append-only. Each successful exchange writes the user turn and
//! the assistant turn in a single statement; reads return the most recent turns
//! for one user in chronological order.
//!
//! User ids and user messages are bound exactly as received, so an absent value
//! is stored as NULL. A NULL user id never matches a history lookup.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::conversation::{Message, Role};

/// Number of prior turns fed back to the model on every request
pub const HISTORY_LIMIT: usize = 6;

/// Errors from the conversation store
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage capability used by the chat workflow
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Up to `limit` most recent messages for `user_id`, oldest first
    async fn recent_messages(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Append a user turn and the assistant's reply as one atomic write
    async fn append_exchange(
        &self,
        user_id: Option<&str>,
        user_message: Option<&str>,
        reply: &str,
    ) -> Result<(), MemoryError>;
}

/// Memory store for conversation persistence
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    /// Create a new memory store with the given SQLite database path
    pub async fn new(db_path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store
    pub async fn new_in_memory_async() -> Result<Self, MemoryError> {
        // One connection only: every sqlite::memory: connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the database schema
    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                userId TEXT,
                role TEXT NOT NULL,
                content TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(userId, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Total number of stored messages for a user; `None` counts NULL user ids
    pub async fn count_messages(&self, user_id: Option<&str>) -> Result<i64, MemoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE userId IS ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn recent_messages(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        // Both turns of an exchange share a timestamp, so id breaks ties
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT role, content
            FROM messages
            WHERE userId = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Reverse to get chronological order
        Ok(rows
            .into_iter()
            .rev()
            .map(|(role, content)| Message {
                role: Role::from_stored(&role),
                content: content.unwrap_or_default(),
            })
            .collect())
    }

    async fn append_exchange(
        &self,
        user_id: Option<&str>,
        user_message: Option<&str>,
        reply: &str,
    ) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO messages (userId, role, content)
            VALUES (?, 'user', ?), (?, 'assistant', ?)
            "#,
        )
        .bind(user_id)
        .bind(user_message)
        .bind(user_id)
        .bind(reply)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_read_exchange() {
        let store = MemoryStore::new_in_memory_async().await.unwrap();

        store
            .append_exchange(Some("u1"), Some("hi"), "Hello! 🐾")
            .await
            .unwrap();

        let messages = store.recent_messages(Some("u1"), HISTORY_LIMIT).await.unwrap();
        assert_eq!(
            messages,
            vec![Message::user("hi"), Message::assistant("Hello! 🐾")]
        );
    }

    #[tokio::test]
    async fn test_recent_messages_keeps_latest_window_in_order() {
        let store = MemoryStore::new_in_memory_async().await.unwrap();

        for i in 0..4 {
            store
                .append_exchange(Some("u1"), Some(&format!("q{i}")), &format!("a{i}"))
                .await
                .unwrap();
        }

        let messages = store.recent_messages(Some("u1"), HISTORY_LIMIT).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2", "q3", "a3"]);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[5].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_history_is_scoped_per_user() {
        let store = MemoryStore::new_in_memory_async().await.unwrap();

        store.append_exchange(Some("u1"), Some("mine"), "ok").await.unwrap();
        store.append_exchange(Some("u2"), Some("theirs"), "ok").await.unwrap();

        let messages = store.recent_messages(Some("u2"), HISTORY_LIMIT).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "theirs");
        assert_eq!(store.count_messages(Some("u1")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_history() {
        let store = MemoryStore::new_in_memory_async().await.unwrap();

        let messages = store
            .recent_messages(Some("nobody"), HISTORY_LIMIT)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let store = MemoryStore::new_in_memory_async().await.unwrap();
        store.append_exchange(Some("u1"), Some("hi"), "hey").await.unwrap();

        let first = store.recent_messages(Some("u1"), HISTORY_LIMIT).await.unwrap();
        let second = store.recent_messages(Some("u1"), HISTORY_LIMIT).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_absent_values_are_stored_as_null() {
        let store = MemoryStore::new_in_memory_async().await.unwrap();

        store.append_exchange(None, None, "who?").await.unwrap();

        assert_eq!(store.count_messages(None).await.unwrap(), 2);
        assert!(store
            .recent_messages(None, HISTORY_LIMIT)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unusable_directory_is_reported() {
        let blocker = std::env::temp_dir().join(format!("maincoon-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = MemoryStore::new(&blocker.join("chat.db")).await;
        std::fs::remove_file(&blocker).ok();

        assert!(matches!(result, Err(MemoryError::Io(_))));
    }
}

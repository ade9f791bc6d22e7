//! SQLite store.
//!
//! Three tables in one database file:
//! - `conversations`: one row per conversation
//! - `messages`: the append-only log; the integer `seq` key decides order
//! - `processed_stories`: the ingest ledger

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hnrag_core::error::StoreError;
use hnrag_core::message::{Conversation, ConversationId, Message, Sender};
use hnrag_core::store::{ConversationStore, IngestLedger};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` gives an ephemeral database held by a single connection.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let (options, max_connections) = if path == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?;
            (options, 1)
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                    })?;
                }
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            (options, 4)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options.pragma("foreign_keys", "ON"))
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT UNIQUE NOT NULL,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                sender           TEXT NOT NULL,
                content          TEXT NOT NULL,
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_stories (
                story_id    INTEGER PRIMARY KEY NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("processed_stories table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StoreError::QueryFailed(format!("seq column: {e}")))?;
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let conversation_id: String = row
            .try_get("conversation_id")
            .map_err(|e| StoreError::QueryFailed(format!("conversation_id column: {e}")))?;
        let sender: String = row
            .try_get("sender")
            .map_err(|e| StoreError::QueryFailed(format!("sender column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Message {
            id,
            conversation_id: ConversationId(conversation_id),
            seq,
            sender: Sender::from_str(&sender).map_err(StoreError::QueryFailed)?,
            content,
            created_at: parse_timestamp(&created_at),
        })
    }

    async fn require_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        match self.find_conversation(id).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::ConversationNotFound(id.to_string())),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(&self) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new();
        sqlx::query("INSERT INTO conversations (id, created_at) VALUES (?, ?)")
            .bind(conversation.id.as_str())
            .bind(conversation.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("create conversation: {e}")))?;
        debug!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT id, created_at FROM conversations WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("find conversation: {e}")))?;

        row.map(|row| {
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
            Ok(Conversation {
                id: id.clone(),
                created_at: parse_timestamp(&created_at),
            })
        })
        .transpose()
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: Sender,
        content: &str,
    ) -> Result<Message, StoreError> {
        self.require_conversation(conversation_id).await?;

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id.as_str())
        .bind(sender.as_str())
        .bind(content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("append message: {e}")))?;

        Ok(Message {
            id,
            conversation_id: conversation_id.clone(),
            seq: result.last_insert_rowid(),
            sender,
            content: content.to_string(),
            created_at,
        })
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.require_conversation(conversation_id).await?;

        let rows = sqlx::query(
            "SELECT seq, id, conversation_id, sender, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(conversation_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("recent messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        self.require_conversation(conversation_id).await?;

        let rows = sqlx::query(
            "SELECT seq, id, conversation_id, sender, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(conversation_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }
}

#[async_trait]
impl IngestLedger for SqliteStore {
    async fn is_processed(&self, story_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM processed_stories WHERE story_id = ?")
            .bind(story_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("ledger lookup: {e}")))?;
        Ok(row.is_some())
    }

    async fn mark_processed(&self, story_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO processed_stories (story_id, created_at) VALUES (?, ?)")
            .bind(story_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("ledger insert: {e}")))?;
        Ok(())
    }
}

//! Message persistence (SQLite).

use crate::error::{Result as CrateResult, StoreError};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row as _, SqlitePool};

/// A persisted inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Store-assigned, monotonically increasing. Only used for ordering.
    pub sequence: i64,
    pub sender: String,
    pub text: String,
    /// UTC instant the store accepted the message.
    pub timestamp: DateTime<Utc>,
}

/// Append-only store of inbound messages keyed by sender.
///
/// Every call acquires its own connection from the pool and releases it when
/// the call returns, on success and on error alike.
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `url` and run pending migrations.
    pub async fn connect(url: &str) -> CrateResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(StoreError::Connect)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::Migration)?;
        Ok(Self { pool })
    }

    /// Insert a message stamped with the current UTC time. Returns its sequence.
    pub async fn save(&self, sender: &str, text: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let result =
            sqlx::query("INSERT INTO Mensajes (Usuario, Texto, FechaHora) VALUES (?, ?, ?)")
                .bind(sender)
                .bind(text)
                .bind(Utc::now())
                .execute(&mut *conn)
                .await?;

        Ok(result.last_insert_rowid())
    }

    /// Load at most `limit` messages for `sender`, oldest first.
    pub async fn fetch_recent(
        &self,
        sender: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        // SQLite treats a negative LIMIT as unbounded.
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT Id, Usuario, Texto, FechaHora \
             FROM Mensajes \
             WHERE Usuario = ? \
             ORDER BY Id DESC \
             LIMIT ?",
        )
        .bind(sender)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(|row| -> Result<StoredMessage, sqlx::Error> {
                Ok(StoredMessage {
                    sequence: row.try_get("Id")?,
                    sender: row.try_get("Usuario")?,
                    text: row.try_get("Texto").unwrap_or_default(),
                    timestamp: row
                        .try_get("FechaHora")
                        .unwrap_or(DateTime::<Utc>::MIN_UTC),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        // Reverse to chronological order
        messages.reverse();

        Ok(messages)
    }

    /// Number of stored messages for `sender`.
    pub async fn count_for(&self, sender: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Mensajes WHERE Usuario = ?")
            .bind(sender)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// Persist a message, logging instead of failing. A lost write only
    /// costs future context.
    pub async fn save_or_log(&self, sender: &str, text: &str) -> Option<i64> {
        match self.save(sender, text).await {
            Ok(sequence) => Some(sequence),
            Err(error) => {
                tracing::warn!(%error, %sender, "failed to persist message");
                None
            }
        }
    }

    /// Load recent history, degrading to an empty history on failure.
    pub async fn fetch_recent_or_empty(&self, sender: &str, limit: i64) -> Vec<StoredMessage> {
        self.fetch_recent(sender, limit).await.unwrap_or_else(|error| {
            tracing::warn!(%error, %sender, "failed to load message history");
            Vec::new()
        })
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

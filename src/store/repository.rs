//! SQLite-backed implementation of the durable log.

use async_trait::async_trait;

use super::db::ChatDb;
use super::log::{DurableLog, LogError};
use super::models::Message;

const MESSAGE_COLUMNS: &str =
    "id, room_name, sender_id, sender_name, kind, body, build_ids, is_delivered, is_seen, timestamp";

/// Durable log backed by the relay's SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteLog {
    db: ChatDb,
}

impl SqliteLog {
    pub fn new(db: ChatDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &ChatDb {
        &self.db
    }

    /// Add an identity to a room's roster.
    ///
    /// Rosters are managed outside the relay core; this exists for
    /// operational tooling and tests. Idempotent.
    pub async fn add_participant(&self, room: &str, user_id: &str) -> Result<(), LogError> {
        sqlx::query("INSERT OR IGNORE INTO participants (room_name, user_id) VALUES (?, ?)")
            .bind(room)
            .bind(user_id)
            .execute(self.db.pool())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    /// Fetch a single message by id.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, LogError> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(unavailable)
    }
}

fn unavailable(err: sqlx::Error) -> LogError {
    LogError::Unavailable(err.to_string())
}

#[async_trait]
impl DurableLog for SqliteLog {
    async fn append(&self, message: &Message) -> Result<(), LogError> {
        let build_ids = match &message.build_ids {
            Some(ids) => Some(
                serde_json::to_string(ids)
                    .map_err(|err| LogError::Unavailable(err.to_string()))?,
            ),
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (id, room_name, sender_id, sender_name, kind, body, build_ids,
                 is_delivered, is_seen, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.room_name)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(message.kind.to_string())
        .bind(&message.body)
        .bind(&build_ids)
        .bind(message.is_delivered)
        .bind(message.is_seen)
        .bind(message.timestamp)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(LogError::Conflict)
            }
            Err(err) => Err(unavailable(err)),
        }
    }

    async fn update_delivered(&self, id: &str) -> Result<(), LogError> {
        sqlx::query("UPDATE messages SET is_delivered = 1 WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn update_seen(&self, id: &str) -> Result<(), LogError> {
        sqlx::query("UPDATE messages SET is_seen = 1 WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn recent_by_room(&self, room: &str, limit: u32) -> Result<Vec<Message>, LogError> {
        // Most recent window of the room, presented oldest first. The rowid
        // tiebreak keeps same-timestamp messages in insertion order.
        sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS}, rowid AS seq
                FROM messages
                WHERE room_name = ?
                ORDER BY timestamp DESC, seq DESC
                LIMIT ?
            )
            ORDER BY timestamp ASC, seq ASC
            "#
        ))
        .bind(room)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .map_err(unavailable)
    }

    async fn mark_all_seen_except(&self, room: &str, user_id: &str) -> Result<(), LogError> {
        sqlx::query("UPDATE messages SET is_seen = 1 WHERE room_name = ? AND sender_id != ?")
            .bind(room)
            .bind(user_id)
            .execute(self.db.pool())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn is_participant(&self, room: &str, user_id: &str) -> Result<bool, LogError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE room_name = ? AND user_id = ?)",
        )
        .bind(room)
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(unavailable)
    }
}

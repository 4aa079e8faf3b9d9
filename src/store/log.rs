//! The durable log contract consumed by the relay.

use async_trait::async_trait;
use thiserror::Error;

use super::models::Message;

/// Errors surfaced by durable log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// A message with the same id already exists. Callers treat this as a
    /// duplicate submission, not a user-facing error.
    #[error("message id already exists")]
    Conflict,

    /// The store could not be reached or the operation failed. Safe to
    /// retry: every write is an independent, idempotent operation.
    #[error("durable log unavailable: {0}")]
    Unavailable(String),
}

/// Append-only, queryable store of every message ever sent in a room.
///
/// This is the system of record; the hot cache is always reconstructible
/// from it. The trait seam exists so the relay can be exercised against
/// in-memory and fault-injecting implementations.
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Record a message. Fails with [`LogError::Conflict`] if the id is taken.
    async fn append(&self, message: &Message) -> Result<(), LogError>;

    /// Set `is_delivered = true`. Idempotent; no-op if the id is absent.
    async fn update_delivered(&self, id: &str) -> Result<(), LogError>;

    /// Set `is_seen = true`. Idempotent; no-op if the id is absent.
    async fn update_seen(&self, id: &str) -> Result<(), LogError>;

    /// The most recent `limit` messages of a room, oldest first.
    async fn recent_by_room(&self, room: &str, limit: u32) -> Result<Vec<Message>, LogError>;

    /// Bulk-set `is_seen = true` for every message in the room not authored
    /// by `user_id`. Models "opening a room marks its contents read".
    async fn mark_all_seen_except(&self, room: &str, user_id: &str) -> Result<(), LogError>;

    /// Whether `user_id` belongs to the room's participant set.
    async fn is_participant(&self, room: &str, user_id: &str) -> Result<bool, LogError>;
}

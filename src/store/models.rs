//! Message model shared by the durable log and the wire layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Kind of a relayed message.
///
/// `Text` is a plain chat line; `Bundle` references externally-stored
/// artifacts by id and may carry an empty body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Bundle,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Bundle => write!(f, "bundle"),
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "bundle" => Ok(MessageKind::Bundle),
            _ => Err(format!("unknown message kind: {}", s)),
        }
    }
}

/// A message as recorded by the durable log.
///
/// The id is caller-supplied and globally unique; the client must be able
/// to reference it before the server acknowledges the message. `timestamp`
/// is server-assigned and immutable. The delivered/seen flags are
/// monotonic: once true they never revert.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub room_name: String,
    pub sender_id: String,
    pub sender_name: String,
    pub kind: MessageKind,
    pub body: String,
    /// Ordered artifact references; present only for bundle messages.
    pub build_ids: Option<Vec<String>>,
    pub is_delivered: bool,
    pub is_seen: bool,
    pub timestamp: DateTime<Utc>,
}

impl sqlx::FromRow<'_, SqliteRow> for Message {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let build_ids: Option<String> = row.try_get("build_ids")?;
        Ok(Self {
            id: row.try_get("id")?,
            room_name: row.try_get("room_name")?,
            sender_id: row.try_get("sender_id")?,
            sender_name: row.try_get("sender_name")?,
            kind: kind.parse().unwrap_or_default(),
            body: row.try_get("body")?,
            build_ids: build_ids.and_then(|raw| serde_json::from_str(&raw).ok()),
            is_delivered: row.try_get("is_delivered")?,
            is_seen: row.try_get("is_seen")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

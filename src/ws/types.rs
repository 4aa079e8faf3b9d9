//! Wire event types for the room relay protocol.
//!
//! Both directions use the same envelope: `{"type": ..., "payload": ...}`.
//! The enums are closed: adding or removing an event type is a
//! compile-time-checked change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Message, MessageKind};

// ============================================================================
// Events (Client -> Server)
// ============================================================================

/// Events a client may send over the socket.
///
/// Fields default to empty when missing so that incomplete payloads reach
/// the relay's validation (which drops them silently) instead of tearing
/// down the connection at the parse boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Plain text message. Requires a caller-supplied unique id.
    ChatMessage {
        #[serde(default)]
        id: String,
        #[serde(default)]
        message: String,
    },

    /// Message referencing externally-stored artifacts by id.
    BuildBundle {
        #[serde(default)]
        id: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        build_ids: Vec<String>,
    },

    /// Ephemeral typing indicator. Never persisted.
    Typing {
        #[serde(default)]
        is_typing: bool,
    },

    /// Assert that a message reached this client.
    MessageDelivered {
        #[serde(default)]
        message_id: String,
    },

    /// Assert that a message was seen by this client.
    MessageSeen {
        #[serde(default)]
        message_id: String,
    },
}

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Events fanned out to room members.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Merged history snapshot, oldest first. Sent once per connection,
    /// before any live event generated after the connect.
    ChatHistory(Vec<MessageView>),

    /// A relayed text message.
    ChatMessage(MessageView),

    /// A relayed artifact bundle.
    BuildBundle(MessageView),

    /// Typing indicator echo, sender included.
    Typing { sender_id: String, is_typing: bool },

    /// Pass-through of a client's delivered assertion.
    MessageDelivered { message_id: String },

    /// Either a pass-through of a client's seen assertion (`message_id`)
    /// or the room-open sweep (`seen_by`).
    MessageSeen {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seen_by: Option<String>,
    },

    /// Sent to the originating session only, when the durable log stayed
    /// unavailable through the retry budget. The client may re-send.
    DeliveryFailed { message_id: String },
}

/// Client-facing snapshot of a message.
///
/// Also the hot cache entry format. Entries written by an older schema may
/// lack `kind`, `build_ids` or `sender_name`; serde defaults normalize them
/// instead of rejecting the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub message: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_ids: Option<Vec<String>>,
    pub is_delivered: bool,
    pub is_seen: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            message: message.body.clone(),
            kind: message.kind,
            build_ids: message.build_ids.clone(),
            is_delivered: message.is_delivered,
            is_seen: message.is_seen,
            timestamp: message.timestamp,
        }
    }
}

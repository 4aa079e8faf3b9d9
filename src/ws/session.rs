//! One live connection bound to one identity and one room.

use chrono::{DateTime, Utc};

use crate::auth::Identity;
use crate::registry::{RoomRegistry, SessionId};

/// Lifecycle of a session. There is no transition back from Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Admission in progress.
    Pending,
    /// Able to send and receive.
    Open,
    /// Terminal.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Open => write!(f, "open"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Connection handle. Never persisted: its only lasting effect is the
/// messages it causes to flow through the relay.
pub struct Session {
    id: SessionId,
    identity: Identity,
    room: String,
    created_at: DateTime<Utc>,
    state: SessionState,
}

impl Session {
    pub fn new(identity: Identity, room: String) -> Self {
        Self {
            id: SessionId::new_v4(),
            identity,
            room,
            created_at: Utc::now(),
            state: SessionState::Pending,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mark the session open once registered for fan-out.
    pub fn open(&mut self) {
        if self.state == SessionState::Pending {
            self.state = SessionState::Open;
        }
    }

    /// Close the session and deregister it from the room. Idempotent.
    pub fn close(&mut self, registry: &RoomRegistry) {
        if self.state == SessionState::Closed {
            return;
        }
        registry.leave(&self.room, self.id);
        self.state = SessionState::Closed;
    }
}

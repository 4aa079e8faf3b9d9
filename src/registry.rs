//! Registry of live sessions per room.
//!
//! Owned by the process and injected into the relay and the socket
//! handlers; there is no ambient global connection table. A room's live
//! set is ephemeral and reconstructed from zero on process start.

use dashmap::DashMap;
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::ServerEvent;

/// Size of the per-session outbound buffer.
const SESSION_BUFFER_SIZE: usize = 64;

/// Identifier of one live connection.
pub type SessionId = Uuid;

/// A sender for events to a specific session.
pub type EventSender = mpsc::Sender<ServerEvent>;

/// Tracks, per room, the set of live sessions subscribed to its events.
pub struct RoomRegistry {
    rooms: DashMap<String, HashMap<SessionId, EventSender>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Register a session with a room.
    ///
    /// Returns the receiver the session's outbound writer drains.
    pub fn join(&self, room: &str, session_id: SessionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER_SIZE);
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(session_id, tx);
        info!("session {session_id} joined room {room}");
        rx
    }

    /// Deregister a session. Idempotent.
    ///
    /// The room entry itself is kept even when empty; an empty room is a
    /// valid, cheap steady state.
    pub fn leave(&self, room: &str, session_id: SessionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            if members.remove(&session_id).is_some() {
                info!("session {session_id} left room {room}");
            }
        }
    }

    /// Snapshot of a room's live sessions.
    ///
    /// Taken under the map shard lock, so a completed `leave` is always
    /// visible to the next fan-out.
    pub fn members_of(&self, room: &str) -> Vec<(SessionId, EventSender)> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live sessions in a room.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Deliver an event to every live session in the room, sender included.
    ///
    /// Fan-out never blocks on a session. A closed receiver is skipped; a
    /// full buffer means the session cannot keep up, so it is dropped from
    /// the room, which its writer task observes as a closed channel.
    pub fn broadcast(&self, room: &str, event: ServerEvent) {
        for (session_id, tx) in self.members_of(room) {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("session {session_id} in {room} is gone, skipping fan-out");
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("session {session_id} in {room} cannot keep up, dropping it");
                    self.leave(room, session_id);
                }
            }
        }
    }

    /// Deliver an event to a single session in the room.
    ///
    /// Returns false if the session is not registered, already gone, or
    /// dropped here because its buffer is full.
    pub fn send_to(&self, room: &str, session_id: SessionId, event: ServerEvent) -> bool {
        let Some(tx) = self
            .rooms
            .get(room)
            .and_then(|members| members.get(&session_id).cloned())
        else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("session {session_id} in {room} cannot keep up, dropping it");
                self.leave(room, session_id);
                false
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(sender: &str) -> ServerEvent {
        ServerEvent::Typing {
            sender_id: sender.to_string(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn test_join_broadcast_leave() {
        let registry = RoomRegistry::new();
        let a = SessionId::new_v4();
        let b = SessionId::new_v4();

        let mut rx_a = registry.join("r1", a);
        let mut rx_b = registry.join("r1", b);
        assert_eq!(registry.member_count("r1"), 2);

        registry.broadcast("r1", typing("alice"));
        assert_eq!(rx_a.recv().await.unwrap(), typing("alice"));
        assert_eq!(rx_b.recv().await.unwrap(), typing("alice"));

        registry.leave("r1", a);
        assert_eq!(registry.member_count("r1"), 1);

        // Leave is visible before the next fan-out.
        registry.broadcast("r1", typing("bob"));
        assert_eq!(rx_b.recv().await.unwrap(), typing("bob"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_rooms_are_kept() {
        let registry = RoomRegistry::new();
        let a = SessionId::new_v4();

        let _rx = registry.join("r1", a);
        registry.leave("r1", a);

        assert_eq!(registry.member_count("r1"), 0);
        assert!(registry.rooms.contains_key("r1"));
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let a = SessionId::new_v4();

        let _rx = registry.join("r1", a);
        registry.leave("r1", a);
        registry.leave("r1", a);
        registry.leave("never-joined", a);
    }

    #[tokio::test]
    async fn test_send_to_targets_one_session() {
        let registry = RoomRegistry::new();
        let a = SessionId::new_v4();
        let b = SessionId::new_v4();

        let mut rx_a = registry.join("r1", a);
        let mut rx_b = registry.join("r1", b);

        assert!(registry.send_to("r1", a, typing("private")));
        assert_eq!(rx_a.recv().await.unwrap(), typing("private"));
        assert!(rx_b.try_recv().is_err());

        assert!(!registry.send_to("r1", SessionId::new_v4(), typing("x")));
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_poison_fanout() {
        let registry = RoomRegistry::new();
        let a = SessionId::new_v4();
        let b = SessionId::new_v4();

        let rx_a = registry.join("r1", a);
        let mut rx_b = registry.join("r1", b);
        drop(rx_a);

        registry.broadcast("r1", typing("alice"));
        assert_eq!(rx_b.recv().await.unwrap(), typing("alice"));
    }

    #[tokio::test]
    async fn test_backpressured_session_is_dropped_not_waited_on() {
        let registry = RoomRegistry::new();
        let a = SessionId::new_v4();
        // Never drained: the buffer fills and the session is dropped
        // instead of stalling the fan-out.
        let _rx_a = registry.join("r1", a);

        for _ in 0..=SESSION_BUFFER_SIZE {
            registry.broadcast("r1", typing("alice"));
        }
        assert_eq!(registry.member_count("r1"), 0);

        // The room itself stays usable.
        let b = SessionId::new_v4();
        let mut rx_b = registry.join("r1", b);
        registry.broadcast("r1", typing("bob"));
        assert_eq!(rx_b.recv().await.unwrap(), typing("bob"));
    }
}

//! Relay coordinator: validates, persists, and fans out room events.
//!
//! Dispatch for a given room is serialized behind a per-room lock so that
//! interleaved events from different members are applied and fanned out in
//! one total order. Rooms are independent: a room blocked on persistence
//! never blocks another room.
//!
//! The core invariant is durability-before-broadcast: a message is never
//! shown to peers before the durable log has recorded it.

mod retry;

pub use retry::RetryPolicy;

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::auth::Identity;
use crate::cache::{CacheRead, HotCache};
use crate::registry::{RoomRegistry, SessionId};
use crate::store::{DurableLog, LogError, Message, MessageKind};
use crate::ws::{ClientEvent, MessageView, ServerEvent};

/// Default size of the durable history window replayed on connect.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy)]
enum Flag {
    Delivered,
    Seen,
}

/// The coordinator between sessions, the durable log, the hot cache and the
/// room registry. Explicitly constructed and injected; owns no transport.
pub struct Relay {
    log: Arc<dyn DurableLog>,
    cache: Arc<HotCache>,
    registry: Arc<RoomRegistry>,
    retry: RetryPolicy,
    history_limit: u32,
    room_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Relay {
    pub fn new(
        log: Arc<dyn DurableLog>,
        cache: Arc<HotCache>,
        registry: Arc<RoomRegistry>,
        retry: RetryPolicy,
        history_limit: u32,
    ) -> Self {
        Self {
            log,
            cache,
            registry,
            retry,
            history_limit,
            room_locks: DashMap::new(),
        }
    }

    fn room_lock(&self, room: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room.to_string())
            .or_default()
            .clone()
    }

    /// Register a session and replay history to it.
    ///
    /// Runs under the room's ordering lock, so the `chat_history` event is
    /// queued before any live event generated after this connect. After the
    /// replay, opening the room marks its contents read: every message not
    /// authored by this identity is swept seen and the room is told.
    pub async fn attach(
        &self,
        room: &str,
        identity: &Identity,
        session_id: SessionId,
    ) -> mpsc::Receiver<ServerEvent> {
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;

        let rx = self.registry.join(room, session_id);

        let history = self.merged_history(room).await;
        self.registry
            .send_to(room, session_id, ServerEvent::ChatHistory(history));

        match self
            .retry
            .run(|| self.log.mark_all_seen_except(room, &identity.id))
            .await
        {
            Ok(()) => {
                self.registry.broadcast(
                    room,
                    ServerEvent::MessageSeen {
                        message_id: None,
                        seen_by: Some(identity.id.clone()),
                    },
                );
            }
            // Never broadcast a seen state the log did not record.
            Err(err) => warn!("seen sweep failed for {room}: {err}"),
        }

        rx
    }

    /// Apply one inbound event. Malformed payloads are dropped silently;
    /// no error is ever surfaced to the caller.
    pub async fn dispatch(
        &self,
        room: &str,
        sender: &Identity,
        origin: SessionId,
        event: ClientEvent,
    ) {
        let lock = self.room_lock(room);
        let _guard = lock.lock().await;

        match event {
            ClientEvent::ChatMessage { id, message } => {
                if id.is_empty() || message.is_empty() {
                    debug!("dropping chat_message with missing id or body in {room}");
                    return;
                }
                self.relay_message(room, sender, origin, id, message, MessageKind::Text, None)
                    .await;
            }

            ClientEvent::BuildBundle {
                id,
                message,
                build_ids,
            } => {
                if id.is_empty() || build_ids.is_empty() {
                    debug!("dropping build_bundle with missing id or artifacts in {room}");
                    return;
                }
                self.relay_message(
                    room,
                    sender,
                    origin,
                    id,
                    message,
                    MessageKind::Bundle,
                    Some(build_ids),
                )
                .await;
            }

            // Ephemeral: fan out to the whole room, sender included.
            ClientEvent::Typing { is_typing } => {
                self.registry.broadcast(
                    room,
                    ServerEvent::Typing {
                        sender_id: sender.id.clone(),
                        is_typing,
                    },
                );
            }

            ClientEvent::MessageDelivered { message_id } => {
                self.relay_flag(room, origin, message_id, Flag::Delivered)
                    .await;
            }

            ClientEvent::MessageSeen { message_id } => {
                self.relay_flag(room, origin, message_id, Flag::Seen).await;
            }
        }
    }

    /// Persist a message, then fan it out. Order matters: peers must never
    /// observe a message that can vanish on restart.
    #[allow(clippy::too_many_arguments)]
    async fn relay_message(
        &self,
        room: &str,
        sender: &Identity,
        origin: SessionId,
        id: String,
        body: String,
        kind: MessageKind,
        build_ids: Option<Vec<String>>,
    ) {
        let message = Message {
            id,
            room_name: room.to_string(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            kind,
            body,
            build_ids,
            // Durably recorded is what this system calls delivered.
            is_delivered: true,
            is_seen: false,
            timestamp: Utc::now(),
        };

        match self.retry.run(|| self.log.append(&message)).await {
            Ok(()) => {}
            Err(LogError::Conflict) => {
                info!("duplicate message {} in {room}, ignoring", message.id);
                return;
            }
            Err(LogError::Unavailable(reason)) => {
                warn!(
                    "dropping message {} in {room}: durable log unavailable: {reason}",
                    message.id
                );
                self.registry.send_to(
                    room,
                    origin,
                    ServerEvent::DeliveryFailed {
                        message_id: message.id.clone(),
                    },
                );
                return;
            }
        }

        let view = MessageView::from(&message);
        if let Err(err) = self.cache.push(room, &view) {
            warn!("hot cache push failed for {room}: {err}");
        }

        let event = match kind {
            MessageKind::Text => ServerEvent::ChatMessage(view),
            MessageKind::Bundle => ServerEvent::BuildBundle(view),
        };
        self.registry.broadcast(room, event);
    }

    /// Idempotent flag update followed by a pass-through fan-out. The
    /// payload shape is owned by the client layer and not reinterpreted.
    ///
    /// A missing `message_id` cannot be marked durably, but the assertion
    /// is still passed through to the room unchanged.
    async fn relay_flag(&self, room: &str, origin: SessionId, message_id: String, flag: Flag) {
        if message_id.is_empty() {
            debug!("flag update without message_id in {room}, passing through");
        } else {
            let result = match flag {
                Flag::Delivered => {
                    self.retry
                        .run(|| self.log.update_delivered(&message_id))
                        .await
                }
                Flag::Seen => self.retry.run(|| self.log.update_seen(&message_id)).await,
            };

            match result {
                Ok(()) => {}
                Err(LogError::Conflict) => {
                    debug!("conflicting flag update for {message_id} in {room}");
                    return;
                }
                Err(LogError::Unavailable(reason)) => {
                    warn!("flag update for {message_id} in {room} failed: {reason}");
                    self.registry
                        .send_to(room, origin, ServerEvent::DeliveryFailed { message_id });
                    return;
                }
            }
        }

        let event = match flag {
            Flag::Delivered => ServerEvent::MessageDelivered { message_id },
            Flag::Seen => ServerEvent::MessageSeen {
                message_id: Some(message_id),
                seen_by: None,
            },
        };
        self.registry.broadcast(room, event);
    }

    /// Merged history view for replay, oldest first.
    ///
    /// The durable window is the authoritative base; cache entries whose id
    /// is not in the base (not yet visible in a bounded top-N read) are
    /// appended. The merge is idempotent: no duplicate ids.
    pub async fn merged_history(&self, room: &str) -> Vec<MessageView> {
        let mut merged: Vec<MessageView> = match self
            .retry
            .run(|| self.log.recent_by_room(room, self.history_limit))
            .await
        {
            Ok(messages) => messages.iter().map(MessageView::from).collect(),
            Err(err) => {
                warn!("durable history read failed for {room}: {err}");
                Vec::new()
            }
        };

        let cached = match self.cache.read(room) {
            Ok(CacheRead::Hit(entries)) => entries,
            Ok(CacheRead::Empty) => Vec::new(),
            Err(err) => {
                warn!("hot cache read failed for {room}: {err}");
                Vec::new()
            }
        };

        let known: HashSet<String> = merged.iter().map(|view| view.id.clone()).collect();
        for entry in cached {
            if !known.contains(&entry.id) {
                merged.push(entry);
            }
        }

        merged
    }
}

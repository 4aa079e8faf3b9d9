//! Bounded per-room hot cache of recent message snapshots.
//!
//! A performance accelerator for history replay on connect, never the
//! system of record. Entries are stored as JSON snapshots so that entries
//! written by an older schema normalize through serde defaults on read.

use dashmap::DashMap;
use log::warn;
use std::collections::VecDeque;
use thiserror::Error;

use crate::ws::MessageView;

/// Most-recent-K bound per room.
pub const DEFAULT_CACHE_CAPACITY: usize = 20;

/// Errors surfaced by cache operations. Always non-fatal to dispatch.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("hot cache unavailable: {0}")]
    Unavailable(String),
}

/// Result of a cache read. Emptiness is not an error: it triggers the same
/// durable base-read path as a genuine miss, but the two are never conflated
/// with the cache being down.
#[derive(Debug, PartialEq)]
pub enum CacheRead {
    Hit(Vec<MessageView>),
    Empty,
}

/// Bounded, room-scoped recency cache.
///
/// Per-room lists are only pushed by the room's serialized dispatcher, but
/// the map itself is shared across rooms running in parallel.
pub struct HotCache {
    capacity: usize,
    // Newest first, like the recency list it mirrors.
    rooms: DashMap<String, VecDeque<String>>,
}

/// Cache key is a pure function of the room name; no cross-room leakage.
fn room_key(room: &str) -> String {
    format!("chat:room:{room}")
}

impl HotCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rooms: DashMap::new(),
        }
    }

    /// Insert at the head of the room's recency list and trim to capacity.
    pub fn push(&self, room: &str, view: &MessageView) -> Result<(), CacheError> {
        let raw = serde_json::to_string(view)
            .map_err(|err| CacheError::Unavailable(err.to_string()))?;
        let mut list = self.rooms.entry(room_key(room)).or_default();
        list.push_front(raw);
        list.truncate(self.capacity);
        Ok(())
    }

    /// Read up to capacity entries, oldest first.
    pub fn read(&self, room: &str) -> Result<CacheRead, CacheError> {
        let Some(list) = self.rooms.get(&room_key(room)) else {
            return Ok(CacheRead::Empty);
        };

        let entries: Vec<MessageView> = list
            .iter()
            .rev()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(view) => Some(view),
                Err(err) => {
                    warn!("dropping undecodable cache entry in {room}: {err}");
                    None
                }
            })
            .collect();

        if entries.is_empty() {
            Ok(CacheRead::Empty)
        } else {
            Ok(CacheRead::Hit(entries))
        }
    }
}

//! Application state shared across handlers.
//!
//! Everything here is explicitly constructed at startup and injected;
//! there is no process-global registry or relay.

use std::sync::Arc;

use crate::auth::IdentityGate;
use crate::registry::RoomRegistry;
use crate::relay::Relay;
use crate::store::DurableLog;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay coordinator for dispatch and history replay.
    pub relay: Arc<Relay>,
    /// Live session registry, per room.
    pub registry: Arc<RoomRegistry>,
    /// Identity gate for connection admission.
    pub gate: Arc<IdentityGate>,
    /// Durable log, also answering participant checks.
    pub log: Arc<dyn DurableLog>,
}

impl AppState {
    pub fn new(
        relay: Arc<Relay>,
        registry: Arc<RoomRegistry>,
        gate: Arc<IdentityGate>,
        log: Arc<dyn DurableLog>,
    ) -> Self {
        Self {
            relay,
            registry,
            gate,
            log,
        }
    }
}

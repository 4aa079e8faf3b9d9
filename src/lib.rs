//! Roomcast library.
//!
//! Core components of the room-based message relay: durable log, hot
//! cache, room registry, relay coordinator, and the WebSocket surface.

pub mod api;
pub mod auth;
pub mod cache;
pub mod registry;
pub mod relay;
pub mod settings;
pub mod store;
pub mod ws;

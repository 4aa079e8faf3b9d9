//! Durable message store.
//!
//! The SQLite database is the system of record for every message a room
//! has ever relayed. The hot cache is derived data and can always be
//! rebuilt from here.

mod db;
mod log;
mod models;
mod repository;

pub use db::ChatDb;
pub use log::{DurableLog, LogError};
pub use models::{Message, MessageKind};
pub use repository::SqliteLog;

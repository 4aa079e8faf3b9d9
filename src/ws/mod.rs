//! WebSocket surface: wire types, session lifecycle, connection handler.
//!
//! One connection is one session bound to one identity and one room. The
//! handler splits the socket into an outbound writer task draining the
//! session's registry channel and an inbound loop feeding the relay.

mod handler;
mod session;
mod types;

pub use handler::ws_handler;
pub use session::{Session, SessionState};
pub use types::{ClientEvent, MessageView, ServerEvent};

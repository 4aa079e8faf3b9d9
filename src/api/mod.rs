//! HTTP/WebSocket API surface.

mod error;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;

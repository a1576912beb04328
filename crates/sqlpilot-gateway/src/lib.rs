//! Sqlpilot gateway crate - axum HTTP server and WebSocket endpoint.
//!
//! Owns the session store, the session-establishment middleware (which
//! writes the login audit row), the WebSocket wire codec, and the
//! in-flight request registry used for best-effort cancellation.

pub mod error;
pub mod messages;
pub mod registry;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use registry::InFlightRegistry;
pub use routes::{create_router, start_server};
pub use session::SessionStore;
pub use state::AppState;

//! HTTP server for the clipdock chunked upload service.
//!
//! Receives chunk transmissions, correlates them into upload sessions,
//! reassembles completed sessions into artifacts, and sweeps abandoned
//! sessions.

pub mod assembler;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweep;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

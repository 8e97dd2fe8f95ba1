//! Request handlers.

pub mod chunks;
pub mod common;
pub mod sessions;

pub use chunks::receive_chunk;
pub use common::health_check;
pub use sessions::{abort_session, get_session};

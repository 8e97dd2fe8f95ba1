//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Multipart framing overhead allowed on top of the chunk payload.
const BODY_OVERHEAD: u64 = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // axum's default body limit (2 MB) is far below a media chunk; size
    // the limit from config instead.
    let body_limit = state.config.server.max_chunk_size + BODY_OVERHEAD;

    let mut router = Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/v1/health", get(handlers::health_check))
        // Chunk intake
        .route("/v1/chunks", post(handlers::receive_chunk))
        // Session state and abort
        .route(
            "/v1/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::abort_session),
        )
        .layer(DefaultBodyLimit::max(body_limit as usize));

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

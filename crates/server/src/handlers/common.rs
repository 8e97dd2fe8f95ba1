//! Health check handler.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;

/// GET /v1/health - liveness plus backing-store connectivity.
///
/// Intentionally unauthenticated for load balancers and k8s probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state
        .registry
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("registry unhealthy: {e}")))?;
    state
        .chunks
        .backend()
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("storage unhealthy: {e}")))?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

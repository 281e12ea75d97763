//! Liveness probe.

use axum::{extract::State, Json};
use reddit_mcp_types::HealthResponse;

use crate::operations::now_rfc3339;
use crate::state::AppState;

/// Report that the server is up
///
/// Does not touch the session registry.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    responses(
        (status = 200, description = "Server is serving requests", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(
        state.server_info.name.clone(),
        state.server_info.version.clone(),
        now_rfc3339(),
    ))
}

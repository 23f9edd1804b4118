//! Live connection directory.

use axum::Json;
use axum::extract::State;

use seatmeter_realtime::message::DirectoryEntry;

use crate::dto::response::ApiResponse;
use crate::extractors::AdminUser;
use crate::state::AppState;

/// GET /api/admin/connections
pub async fn list_connections(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Json<ApiResponse<Vec<DirectoryEntry>>> {
    Json(ApiResponse::ok(state.engine.directory.snapshot().await))
}

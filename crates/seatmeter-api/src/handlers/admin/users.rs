//! Admin subscription and connection management for one user.

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use seatmeter_core::types::{AllowanceSnapshot, UserId};
use seatmeter_realtime::control::dispatcher::REASON_ADMIN;

use crate::dto::request::{ApplyPlanRequest, SetLimitRequest};
use crate::dto::response::{ApiResponse, DisconnectResponse, MessageResponse};
use crate::error::ApiError;
use crate::extractors::{AdminUser, ValidatedJson};
use crate::state::AppState;

/// POST /api/admin/users/{id}/plan
pub async fn apply_plan(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ApplyPlanRequest>,
) -> Result<Json<ApiResponse<AllowanceSnapshot>>, ApiError> {
    let user_id = UserId::from_uuid(id);
    tracing::info!(admin = %admin.user_id, user_id = %user_id, "Applying plan");
    let snapshot = state.engine.control.apply_plan(&user_id, req.into()).await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

/// POST /api/admin/users/{id}/deactivate
pub async fn deactivate(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = UserId::from_uuid(id);
    tracing::info!(admin = %admin.user_id, user_id = %user_id, "Deactivating account");
    state.engine.control.deactivate(&user_id).await?;
    Ok(Json(ApiResponse::ok(MessageResponse::new("Account deactivated"))))
}

/// PUT /api/admin/users/{id}/limit
pub async fn set_limit(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SetLimitRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = UserId::from_uuid(id);
    tracing::info!(admin = %admin.user_id, user_id = %user_id, limit = ?req.limit, "Setting connection limit");
    state
        .engine
        .control
        .set_cap_override(&user_id, req.limit)
        .await?;
    let message = match req.limit {
        Some(limit) => format!("Connection limit set to {limit}"),
        None => "Connection limit override cleared".to_string(),
    };
    Ok(Json(ApiResponse::ok(MessageResponse::new(message))))
}

/// POST /api/admin/users/{id}/disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Json<ApiResponse<DisconnectResponse>> {
    let user_id = UserId::from_uuid(id);
    let disconnected = state
        .engine
        .dispatcher
        .disconnect_all_for_user(&user_id, REASON_ADMIN)
        .await;
    tracing::info!(admin = %admin.user_id, user_id = %user_id, disconnected, "Admin disconnect");
    Json(ApiResponse::ok(DisconnectResponse { disconnected }))
}

//! `AdminUser` extractor: pulls the bearer token from the Authorization
//! header, verifies it, and requires the admin role.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use seatmeter_core::error::AppError;
use seatmeter_core::types::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Verified administrator identity.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

impl std::ops::Deref for AdminUser {
    type Target = Identity;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::authentication("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::authentication("Invalid Authorization header format"))?;

        let identity = state.engine.authenticate(token).await?;
        if !identity.is_admin {
            tracing::warn!(user_id = %identity.user_id, "Non-admin request to admin endpoint");
            return Err(AppError::authorization("Administrator role required").into());
        }

        Ok(AdminUser(identity))
    }
}

//! Route definitions for the SeatMeter HTTP API.
//!
//! REST routes are mounted under `/api`; the WebSocket upgrade lives at `/ws`.

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::handlers;
use crate::state::AppState;

/// Build the router with all routes, threading `AppState` through
/// every route via `.with_state(state)`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health_routes())
        .merge(admin_routes());

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(handlers::ws::ws_upgrade))
        .with_state(state)
}

/// Liveness
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

/// Admin directory and per-user subscription control
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/connections",
            get(handlers::admin::connections::list_connections),
        )
        .route(
            "/admin/users/{id}/plan",
            post(handlers::admin::users::apply_plan),
        )
        .route(
            "/admin/users/{id}/deactivate",
            post(handlers::admin::users::deactivate),
        )
        .route(
            "/admin/users/{id}/limit",
            put(handlers::admin::users::set_limit),
        )
        .route(
            "/admin/users/{id}/disconnect",
            post(handlers::admin::users::disconnect),
        )
}

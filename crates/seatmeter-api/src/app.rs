//! Application builder: wires router, middleware, and state into an Axum app.

use axum::Router;
use axum::extract::Request;
use axum::middleware as axum_middleware;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::build_cors_layer;
use crate::middleware::logging::request_logging;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
///
/// Spans carry only the path so `/ws?token=` credentials never reach the logs.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);

    build_router(state)
        .layer(axum_middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http",
                method = %request.method(),
                path = %request.uri().path(),
            )
        }))
        .layer(cors)
}

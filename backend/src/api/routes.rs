//! Route definitions for the API.

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Json, Router};

use super::handlers;
use super::middleware::tracing::correlation_id_middleware;
use super::SharedState;

/// Camera webhook bodies are small JSON or form payloads.
const WEBHOOK_BODY_LIMIT: usize = 256 * 1024;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/readyz", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics))
        .route(
            "/api/v1/openapi.json",
            get(move || {
                let doc = openapi.clone();
                async move { Json(doc) }
            }),
        )
        // Vendor camera webhooks
        .nest(
            "/api/lpr/sites",
            handlers::lpr_webhook::router().layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT)),
        )
        .nest("/api/v1", api_v1_routes())
        .layer(middleware::from_fn(correlation_id_middleware))
        .with_state(state)
}

/// Operator API v1 routes
fn api_v1_routes() -> Router<SharedState> {
    Router::new()
        .nest(
            "/sites/:site_code/devices",
            handlers::whitelist_sync::router().merge(handlers::commands::router()),
        )
        .nest("/events", handlers::events::router())
}

//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::OpenApi;

/// Top-level OpenAPI document for the LPR gateway API.
///
/// Each handler module contributes its own paths and schemas via a
/// per-module `#[derive(OpenApi)]` struct merged in [`build_openapi`].
#[derive(OpenApi)]
#[openapi(
    info(
        title = "LPR Gateway API",
        description = "Webhook endpoints for LPR gate cameras and operator control of whitelist sync.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    tags(
        (name = "webhooks", description = "Camera-facing plate, heartbeat, comet and IO endpoints"),
        (name = "sync", description = "Per-device whitelist bulk sync"),
        (name = "commands", description = "Device command queue"),
        (name = "events", description = "Sync event stream"),
        (name = "health", description = "Health and readiness checks"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.merge(super::handlers::lpr_webhook::LprWebhookApiDoc::openapi());
    doc.merge(super::handlers::whitelist_sync::WhitelistSyncApiDoc::openapi());
    doc.merge(super::handlers::commands::CommandsApiDoc::openapi());
    doc.merge(super::handlers::events::EventsApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());
    doc
}

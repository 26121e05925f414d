//! Operator access to a device's command queue.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::command::{CommandEntry, DeviceCommand};

pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/:device_id/commands",
        get(list_pending_commands).post(enqueue_command),
    )
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueCommandRequest {
    /// `whitelist_add`, `whitelist_remove`, `whitelist_clear`, `gate_open`,
    /// `manual_trigger`, `screenshot` or `manual_command`
    pub command_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// Lower is delivered first; defaults to 1
    pub priority: Option<i32>,
}

/// Queue a command for delivery on the device's next poll
#[utoipa::path(
    post,
    path = "/{device_id}/commands",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "commands",
    params(
        ("site_code" = String, Path, description = "Site code"),
        ("device_id" = i32, Path, description = "Device id"),
    ),
    request_body = EnqueueCommandRequest,
    responses(
        (status = 201, description = "Command queued", body = CommandEntry),
        (status = 400, description = "Unknown command type or invalid payload", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Site or device not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn enqueue_command(
    State(state): State<SharedState>,
    Path((site_code, device_id)): Path<(String, i32)>,
    Json(request): Json<EnqueueCommandRequest>,
) -> Result<(StatusCode, Json<CommandEntry>)> {
    let command = DeviceCommand::decode(request.command_type.trim(), &request.payload)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let entry = state
        .commands
        .enqueue_for_site(&site_code, device_id, command, request.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Unprocessed commands in delivery order
#[utoipa::path(
    get,
    path = "/{device_id}/commands",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "commands",
    params(
        ("site_code" = String, Path, description = "Site code"),
        ("device_id" = i32, Path, description = "Device id"),
    ),
    responses(
        (status = 200, description = "Pending commands", body = Vec<CommandEntry>),
        (status = 404, description = "Site or device not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn list_pending_commands(
    State(state): State<SharedState>,
    Path((site_code, device_id)): Path<(String, i32)>,
) -> Result<Json<Vec<CommandEntry>>> {
    Ok(Json(
        state
            .commands
            .list_pending_for_site(&site_code, device_id)
            .await?,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(enqueue_command, list_pending_commands),
    components(schemas(EnqueueCommandRequest, CommandEntry))
)]
pub struct CommandsApiDoc;

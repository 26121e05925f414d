//! Operator control of per-device whitelist sync.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;
use crate::error::Result;
use crate::models::device::SyncStatus;
use crate::services::whitelist_sync_service::{DeviceSyncSummary, SyncStatusView};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sync-status", get(list_site_sync_status))
        .route("/sync-whitelist", post(trigger_site_sync))
        .route("/:device_id/sync-whitelist", post(trigger_sync))
        .route("/:device_id/cancel-sync", post(cancel_sync))
        .route("/:device_id/sync-status", get(get_sync_status))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncActionResponse {
    pub message: String,
    pub sync: SyncStatusView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SiteSyncTriggered {
    pub message: String,
    pub devices_triggered: usize,
}

/// Request a full whitelist sync on the device's next poll
#[utoipa::path(
    post,
    path = "/{device_id}/sync-whitelist",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "sync",
    params(
        ("site_code" = String, Path, description = "Site code"),
        ("device_id" = i32, Path, description = "Device id"),
    ),
    responses(
        (status = 200, description = "Sync register reset", body = SyncActionResponse),
        (status = 404, description = "Site or device not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn trigger_sync(
    State(state): State<SharedState>,
    Path((site_code, device_id)): Path<(String, i32)>,
) -> Result<Json<SyncActionResponse>> {
    let device = state.sync.require_site_device(&site_code, device_id).await?;
    let sync = state.sync.trigger_sync(device.id).await?;
    Ok(Json(SyncActionResponse {
        message: "Whitelist sync will start on the next device poll".to_string(),
        sync,
    }))
}

/// Abandon the device's current sync run
#[utoipa::path(
    post,
    path = "/{device_id}/cancel-sync",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "sync",
    params(
        ("site_code" = String, Path, description = "Site code"),
        ("device_id" = i32, Path, description = "Device id"),
    ),
    responses(
        (status = 200, description = "Sync cancelled", body = SyncActionResponse),
        (status = 400, description = "No sync to cancel", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Site or device not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn cancel_sync(
    State(state): State<SharedState>,
    Path((site_code, device_id)): Path<(String, i32)>,
) -> Result<Json<SyncActionResponse>> {
    let device = state.sync.require_site_device(&site_code, device_id).await?;
    let sync = state.sync.cancel_sync(device.id).await?;
    Ok(Json(SyncActionResponse {
        message: "Whitelist sync cancelled".to_string(),
        sync,
    }))
}

#[utoipa::path(
    get,
    path = "/{device_id}/sync-status",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "sync",
    params(
        ("site_code" = String, Path, description = "Site code"),
        ("device_id" = i32, Path, description = "Device id"),
    ),
    responses(
        (status = 200, description = "Current sync register", body = SyncStatusView),
        (status = 404, description = "Site or device not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn get_sync_status(
    State(state): State<SharedState>,
    Path((site_code, device_id)): Path<(String, i32)>,
) -> Result<Json<SyncStatusView>> {
    let device = state.sync.require_site_device(&site_code, device_id).await?;
    Ok(Json(state.sync.get_sync_status(device.id).await?))
}

/// Request a whitelist sync on every device of the site
#[utoipa::path(
    post,
    path = "/sync-whitelist",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "sync",
    params(("site_code" = String, Path, description = "Site code")),
    responses(
        (status = 200, description = "Devices reset", body = SiteSyncTriggered),
        (status = 404, description = "Site not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn trigger_site_sync(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
) -> Result<Json<SiteSyncTriggered>> {
    let devices_triggered = state.sync.trigger_site_sync(&site_code).await?;
    Ok(Json(SiteSyncTriggered {
        message: format!("Whitelist sync triggered for {} device(s)", devices_triggered),
        devices_triggered,
    }))
}

#[utoipa::path(
    get,
    path = "/sync-status",
    context_path = "/api/v1/sites/{site_code}/devices",
    tag = "sync",
    params(("site_code" = String, Path, description = "Site code")),
    responses(
        (status = 200, description = "Sync register of every device in the site", body = Vec<DeviceSyncSummary>),
        (status = 404, description = "Site not found", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn list_site_sync_status(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
) -> Result<Json<Vec<DeviceSyncSummary>>> {
    Ok(Json(state.sync.list_site_sync_status(&site_code).await?))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        trigger_sync,
        cancel_sync,
        get_sync_status,
        trigger_site_sync,
        list_site_sync_status,
    ),
    components(schemas(
        SyncActionResponse,
        SiteSyncTriggered,
        SyncStatusView,
        DeviceSyncSummary,
        SyncStatus,
    ))
)]
pub struct WhitelistSyncApiDoc;

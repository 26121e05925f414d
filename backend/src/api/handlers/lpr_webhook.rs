//! Vendor camera webhooks.
//!
//! Cameras address the server by site code and expect the
//! `Response_AlarmInfoPlate` envelope back. Anything the device should do
//! (open the gate, change its whitelist) rides on these responses.

use axum::{
    extract::{Path, State},
    routing::post,
    Form, Json, Router,
};
use utoipa::OpenApi;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::audit::HeartbeatKind;
use crate::models::command::{SerialDataFrame, WhitelistPlate};
use crate::protocol::request::{
    AlarmGioIn, AlarmInfoPlate, AlarmInfoPlateRequest, CometPollRequest, HeartbeatForm,
    IoTriggerRequest, PlateResult, PlateResultContainer, SerialDataPush, SerialDataRequest,
    TimeStamp, Timeval, TriggerResult, TriggerResultContainer,
};
use crate::protocol::response::{
    ContinuePushOffline, DeviceAck, LprResponse, ResponseAlarmInfoPlate, TriggerImage,
    WhiteListOperate,
};
use crate::services::device_interaction_service::PollReply;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/:site_code/webhook/plate-recognition",
            post(plate_recognition),
        )
        .route("/:site_code/webhook/heartbeat", post(heartbeat))
        .route("/:site_code/webhook/comet-poll", post(comet_poll))
        .route("/:site_code/webhook/io-trigger", post(io_trigger))
        .route("/:site_code/webhook/serial-data", post(serial_data))
}

/// Plate recognition result pushed by a camera
#[utoipa::path(
    post,
    path = "/{site_code}/webhook/plate-recognition",
    context_path = "/api/lpr/sites",
    tag = "webhooks",
    params(("site_code" = String, Path, description = "Site code configured on the camera")),
    request_body = AlarmInfoPlateRequest,
    responses(
        (status = 200, description = "Gate decision plus queued device commands", body = LprResponse),
        (status = 404, description = "Unknown site", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn plate_recognition(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
    Json(request): Json<AlarmInfoPlateRequest>,
) -> Result<Json<LprResponse>> {
    let response = state
        .interactions
        .handle_plate_recognition(&site_code, &request)
        .await?;
    Ok(Json(response))
}

/// Periodic form-encoded heartbeat
#[utoipa::path(
    post,
    path = "/{site_code}/webhook/heartbeat",
    context_path = "/api/lpr/sites",
    tag = "webhooks",
    params(("site_code" = String, Path, description = "Site code configured on the camera")),
    request_body(content = HeartbeatForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Queued device commands, or an ack for unknown devices", body = LprResponse),
        (status = 404, description = "Unknown site", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn heartbeat(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
    Form(request): Form<HeartbeatForm>,
) -> Result<Json<PollReply>> {
    let reply = state
        .interactions
        .handle_poll(&site_code, HeartbeatKind::Normal, &request)
        .await?;
    Ok(Json(reply))
}

/// JSON comet long-poll
#[utoipa::path(
    post,
    path = "/{site_code}/webhook/comet-poll",
    context_path = "/api/lpr/sites",
    tag = "webhooks",
    params(("site_code" = String, Path, description = "Site code configured on the camera")),
    request_body = HeartbeatForm,
    responses(
        (status = 200, description = "Queued device commands, or an ack for unknown devices", body = LprResponse),
        (status = 404, description = "Unknown site", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn comet_poll(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
    Json(request): Json<CometPollRequest>,
) -> Result<Json<PollReply>> {
    let reply = state
        .interactions
        .handle_poll(&site_code, HeartbeatKind::Comet, &request)
        .await?;
    Ok(Json(reply))
}

/// IO input change
#[utoipa::path(
    post,
    path = "/{site_code}/webhook/io-trigger",
    context_path = "/api/lpr/sites",
    tag = "webhooks",
    params(("site_code" = String, Path, description = "Site code configured on the camera")),
    request_body = IoTriggerRequest,
    responses(
        (status = 200, description = "Acknowledged", body = DeviceAck),
        (status = 404, description = "Unknown site", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn io_trigger(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
    Json(request): Json<IoTriggerRequest>,
) -> Result<Json<DeviceAck>> {
    let reply = state
        .interactions
        .handle_io_trigger(&site_code, &request)
        .await?;
    Ok(Json(reply))
}

/// Serial port data forwarded by a camera
#[utoipa::path(
    post,
    path = "/{site_code}/webhook/serial-data",
    context_path = "/api/lpr/sites",
    tag = "webhooks",
    params(("site_code" = String, Path, description = "Site code configured on the camera")),
    request_body = SerialDataRequest,
    responses(
        (status = 200, description = "Acknowledged", body = DeviceAck),
        (status = 404, description = "Unknown site", body = crate::api::openapi::ErrorResponse)
    )
)]
pub async fn serial_data(
    State(state): State<SharedState>,
    Path(site_code): Path<String>,
    Json(request): Json<SerialDataRequest>,
) -> Result<Json<DeviceAck>> {
    let reply = state
        .interactions
        .handle_serial_data(&site_code, &request)
        .await?;
    Ok(Json(reply))
}

#[derive(OpenApi)]
#[openapi(
    paths(plate_recognition, heartbeat, comet_poll, io_trigger, serial_data),
    components(schemas(
        AlarmInfoPlateRequest,
        AlarmInfoPlate,
        PlateResultContainer,
        PlateResult,
        TimeStamp,
        Timeval,
        HeartbeatForm,
        IoTriggerRequest,
        AlarmGioIn,
        TriggerResultContainer,
        TriggerResult,
        SerialDataRequest,
        SerialDataPush,
        LprResponse,
        ResponseAlarmInfoPlate,
        TriggerImage,
        WhiteListOperate,
        WhitelistPlate,
        SerialDataFrame,
        ContinuePushOffline,
        DeviceAck,
    ))
)]
pub struct LprWebhookApiDoc;

//! HTTP surface tests: the full router driven with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{TestContext, SERIAL, SITE_CODE};
use lpr_gateway_backend::models::device::SyncStatus;

async fn send(ctx: &TestContext, request: Request<Body>) -> (StatusCode, Value) {
    let response = ctx.router().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()))
    };
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn device_uri(ctx: &TestContext, suffix: &str) -> String {
    format!(
        "/api/v1/sites/{}/devices/{}/{}",
        SITE_CODE, ctx.device.id, suffix
    )
}

fn comet_body() -> Value {
    json!({
        "device_name": "gate-1",
        "ipaddr": "10.0.0.20",
        "port": "80",
        "user_name": "admin",
        "pass_wd": "secret",
        "serialno": SERIAL,
        "channel_num": "0"
    })
}

#[tokio::test]
async fn test_health_reports_healthy() {
    let ctx = TestContext::new().await;
    let (status, body) = send(&ctx, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"]["status"], "healthy");
}

#[tokio::test]
async fn test_responses_carry_correlation_id() {
    let ctx = TestContext::new().await;
    let request = Request::builder()
        .uri("/ready")
        .header("X-Correlation-ID", "ops-7")
        .body(Body::empty())
        .unwrap();
    let response = ctx.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["X-Correlation-ID"], "ops-7");
}

#[tokio::test]
async fn test_plate_webhook_returns_envelope() {
    let ctx = TestContext::new().await;
    let body = json!({
        "AlarmInfoPlate": {
            "channel": 0,
            "deviceName": "gate-1",
            "ipaddr": "10.0.0.20",
            "serialno": SERIAL,
            "result": {
                "PlateResult": {
                    "license": "ZZZ999",
                    "confidence": 91,
                    "plateid": 12,
                    "isoffline": 1,
                    "timeStamp": { "Timeval": { "sec": 1714550400, "usec": 0 } }
                }
            }
        }
    });

    let (status, value) = send(
        &ctx,
        post_json(
            &format!("/api/lpr/sites/{}/webhook/plate-recognition", SITE_CODE),
            body,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let inner = &value["Response_AlarmInfoPlate"];
    assert_eq!(inner["info"], "denied");
    assert_eq!(inner["plateid"], 12);
    assert_eq!(inner["ContinuePushOffline"], json!({ "plateid": 12, "continue": 1 }));
    assert_eq!(ctx.store.response_logs().await.len(), 1);
}

#[tokio::test]
async fn test_webhook_for_unknown_site_is_404() {
    let ctx = TestContext::new().await;
    let (status, body) = send(
        &ctx,
        post_json("/api/lpr/sites/NOPE/webhook/comet-poll", comet_body()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_form_heartbeat_is_recorded() {
    let ctx = TestContext::new().await;
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/lpr/sites/{}/webhook/heartbeat", SITE_CODE))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "device_name=gate-1&ipaddr=10.0.0.20&port=80&user_name=admin&pass_wd=x&serialno={}&channel_num=0",
            SERIAL
        )))
        .unwrap();

    let (status, body) = send(&ctx, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Response_AlarmInfoPlate"]["info"], "ok");

    let heartbeats = ctx.store.heartbeats().await;
    assert_eq!(heartbeats.len(), 1);
    assert_eq!(heartbeats[0].user_name.as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_response_log_omits_password() {
    let ctx = TestContext::new().await;
    send(
        &ctx,
        post_json(
            &format!("/api/lpr/sites/{}/webhook/comet-poll", SITE_CODE),
            comet_body(),
        ),
    )
    .await;

    let logs = ctx.store.response_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].request_type, "comet-poll");
    assert!(logs[0].request_data.get("pass_wd").is_none());
}

#[tokio::test]
async fn test_io_trigger_is_acknowledged() {
    let ctx = TestContext::new().await;
    let body = json!({
        "AlarmGioIn": {
            "serialno": SERIAL,
            "result": { "TriggerResult": { "source": 1, "value": 0 } }
        }
    });
    let (status, value) = send(
        &ctx,
        post_json(&format!("/api/lpr/sites/{}/webhook/io-trigger", SITE_CODE), body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({ "status": "ok", "message": "IO trigger received" }));

    let events = ctx.store.io_triggers().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, ctx.device.id);
    assert_eq!((events[0].source, events[0].value), (1, 0));
    assert_eq!(ctx.store.response_logs().await[0].request_type, "io-trigger");
}

#[tokio::test]
async fn test_serial_data_is_stored_for_known_device() {
    let ctx = TestContext::new().await;
    let uri = format!("/api/lpr/sites/{}/webhook/serial-data", SITE_CODE);
    let frame = |serial: &str| {
        json!({
            "SerialData": {
                "channel": 0,
                "serialno": serial,
                "ipaddr": "10.0.0.20",
                "deviceName": "gate-1",
                "serialChannel": 1,
                "data": "AQID",
                "dataLen": 3
            }
        })
    };

    let (status, value) = send(&ctx, post_json(&uri, frame(SERIAL))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({ "status": "ok", "message": "Serial data received" }));

    let (status, _) = send(&ctx, post_json(&uri, frame("not-registered"))).await;
    assert_eq!(status, StatusCode::OK);

    let logs = ctx.store.serial_data_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].device_id, ctx.device.id);
    assert_eq!(logs[0].serial_channel, 1);
    assert_eq!(logs[0].data_base64, "AQID");
    assert_eq!(logs[0].data_length, 3);
    assert_eq!(ctx.store.response_logs().await.len(), 2);
}

#[tokio::test]
async fn test_trigger_and_cancel_over_http() {
    let ctx = TestContext::new().await;
    ctx.seed_whitelist(7).await;

    let (status, body) = send(&ctx, post_empty(&device_uri(&ctx, "sync-whitelist"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync"]["enabled"], true);
    assert_eq!(body["sync"]["status"], "idle");

    ctx.poll().await;
    let (_, status_body) = send(&ctx, get(&device_uri(&ctx, "sync-status"))).await;
    assert_eq!(status_body["status"], "adding");
    assert_eq!(status_body["total_batches"], 2);
    assert_eq!(status_body["progress"], 50.0);

    let (status, body) = send(&ctx, post_empty(&device_uri(&ctx, "cancel-sync"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync"]["status"], "failed");

    let (status, body) = send(&ctx, post_empty(&device_uri(&ctx, "cancel-sync"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");
    assert_eq!(ctx.sync_status().await.status, SyncStatus::Failed);
}

#[tokio::test]
async fn test_device_of_other_site_is_404() {
    let ctx = TestContext::new().await;
    let other = ctx.store.insert_site("BRANCH", "Branch").await;
    let foreign = ctx.store.insert_device(other.id, "foreign-serial").await;

    let uri = format!(
        "/api/v1/sites/{}/devices/{}/sync-whitelist",
        SITE_CODE, foreign.id
    );
    let (status, _) = send(&ctx, post_empty(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_site_wide_trigger_and_listing() {
    let ctx = TestContext::new().await;
    ctx.store.insert_device(ctx.site.id, "second-serial").await;

    let (status, body) = send(
        &ctx,
        post_empty(&format!("/api/v1/sites/{}/devices/sync-whitelist", SITE_CODE)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices_triggered"], 2);

    let (status, body) = send(
        &ctx,
        get(&format!("/api/v1/sites/{}/devices/sync-status", SITE_CODE)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["sync"]["enabled"] == true));
}

#[tokio::test]
async fn test_enqueue_gate_open_and_deliver() {
    let ctx = TestContext::new().await;

    let (status, body) = send(
        &ctx,
        post_json(
            &device_uri(&ctx, "commands"),
            json!({ "command_type": "gate_open" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["command_type"], "gate_open");
    assert_eq!(body["priority"], 1);

    let (_, pending) = send(&ctx, get(&device_uri(&ctx, "commands"))).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let response = ctx.poll().await;
    assert_eq!(response.info, "ok");

    let (_, pending) = send(&ctx, get(&device_uri(&ctx, "commands"))).await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueue_rejects_unknown_and_oversized_commands() {
    let ctx = TestContext::new().await;

    let (status, body) = send(
        &ctx,
        post_json(&device_uri(&ctx, "commands"), json!({ "command_type": "reboot" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let plates: Vec<Value> = (0..6).map(|i| json!({ "plate": format!("P{}", i) })).collect();
    let (status, _) = send(
        &ctx,
        post_json(
            &device_uri(&ctx, "commands"),
            json!({ "command_type": "whitelist_add_batch", "payload": { "whitelist_data": plates } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.store.commands().await.is_empty());
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let ctx = TestContext::new().await;
    let response = ctx.router().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let ctx = TestContext::new().await;
    let (status, body) = send(&ctx, get("/api/v1/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]
        .as_object()
        .unwrap()
        .contains_key("/api/v1/sites/{site_code}/devices/{device_id}/commands"));
}

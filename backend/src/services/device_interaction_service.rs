//! Device webhook handling: bookkeeping, sync check, entry decision, drain.
//!
//! Every interaction that can carry commands back to the camera runs its
//! sync check and queue drain under the device lock. Failures in the sync
//! machine or the drain are logged and the camera still gets an envelope.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{AppError, Result};
use crate::models::audit::{
    HeartbeatKind, NewEntryLog, NewHeartbeat, NewIoTriggerEvent, NewPlateRecognition,
    NewResponseLog, NewSerialDataLog,
};
use crate::models::site::Site;
use crate::protocol::request::{
    AlarmInfoPlateRequest, HeartbeatForm, IoTriggerRequest, SerialDataRequest,
};
use crate::protocol::response::{
    ContinuePushOffline, DeviceAck, LprResponse, ResponseAlarmInfoPlate, INFO_DENIED, INFO_OK,
};
use crate::services::clock::Clock;
use crate::services::device_lock::{DeviceGuard, DeviceLocks};
use crate::services::device_response_service::DeviceResponseService;
use crate::services::entry_decision_service::EntryDecisionService;
use crate::services::metrics_service;
use crate::services::whitelist_sync_service::WhitelistSyncService;
use crate::storage::{DeviceSighting, LprStore};

/// Body returned to a polling device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PollReply {
    Envelope(LprResponse),
    Ack(DeviceAck),
}

pub struct DeviceInteractionService {
    store: Arc<dyn LprStore>,
    locks: Arc<DeviceLocks>,
    sync: Arc<WhitelistSyncService>,
    responses: Arc<DeviceResponseService>,
    entries: Arc<EntryDecisionService>,
    clock: Arc<dyn Clock>,
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl DeviceInteractionService {
    pub fn new(
        store: Arc<dyn LprStore>,
        locks: Arc<DeviceLocks>,
        sync: Arc<WhitelistSyncService>,
        responses: Arc<DeviceResponseService>,
        entries: Arc<EntryDecisionService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            locks,
            sync,
            responses,
            entries,
            clock,
        }
    }

    /// Plate pushed by a camera: record it, decide, and answer with queued work.
    pub async fn handle_plate_recognition(
        &self,
        site_code: &str,
        request: &AlarmInfoPlateRequest,
    ) -> Result<LprResponse> {
        let started = Instant::now();
        let site = self.require_site(site_code).await?;
        let info = &request.alarm_info_plate;
        let plate = &info.result.plate_result;
        let now = self.clock.now();

        let device = self
            .store
            .upsert_device_seen(
                site.id,
                DeviceSighting {
                    serial_number: info.serial_number.trim(),
                    device_name: non_empty(&info.device_name),
                    ip_address: non_empty(&info.ip_address),
                },
                now,
            )
            .await?;

        let guard = self.locks.acquire(device.id).await;

        let recognition_id = self
            .store
            .record_plate_recognition(NewPlateRecognition {
                site_id: site.id,
                device_id: device.id,
                plate_id: plate.plateid,
                license_plate: plate.license.clone(),
                confidence: plate.confidence,
                direction: plate.direction,
                trigger_type: plate.trigger_type,
                is_offline: plate.is_offline(),
                recognition_timestamp: plate.time_stamp.to_datetime(),
                created_at: now,
            })
            .await?;

        self.check_sync(&guard).await;

        let decision = self.entries.decide(site.id, &plate.license).await?;
        metrics_service::record_entry_decision(decision.allowed);
        if let Some(matched) = &decision.matched {
            self.store.increment_whitelist_entries(matched.id).await?;
        }
        self.store
            .record_entry_log(NewEntryLog {
                site_id: site.id,
                device_id: device.id,
                whitelist_id: decision.matched.as_ref().map(|w| w.id),
                plate_recognition_id: Some(recognition_id),
                license_plate: plate.license.clone(),
                entry_type: decision.entry_type(),
                entry_status: decision.entry_status().to_string(),
                gate_opened: decision.allowed,
                entry_time: now,
            })
            .await?;

        let info_value = if decision.allowed { INFO_OK } else { INFO_DENIED };
        let mut base = ResponseAlarmInfoPlate::ack(info_value, plate.plateid);
        if plate.is_offline() {
            base.continue_push_offline = Some(ContinuePushOffline {
                plateid: plate.plateid,
                continue_push: 1,
            });
        }
        let response = LprResponse::from(self.drain(&guard, site.id, base).await);
        drop(guard);

        tracing::info!(
            site_code,
            device_id = device.id,
            plate = %plate.license,
            plateid = plate.plateid,
            allowed = decision.allowed,
            "Plate recognition processed"
        );
        self.log_response(&site, Some(device.id), "plate-recognition", request, &response, started)
            .await;
        Ok(response)
    }

    /// Heartbeat or comet poll from a camera.
    pub async fn handle_poll(
        &self,
        site_code: &str,
        kind: HeartbeatKind,
        request: &HeartbeatForm,
    ) -> Result<PollReply> {
        let started = Instant::now();
        let site = self.require_site(site_code).await?;
        let now = self.clock.now();

        let Some(device) = self
            .store
            .find_device_by_serial(site.id, request.serialno.trim())
            .await?
        else {
            tracing::warn!(
                site_code,
                serialno = %request.serialno,
                kind = kind.as_str(),
                "Poll from unknown device"
            );
            let reply = PollReply::Ack(DeviceAck::no_device());
            self.log_response(&site, None, kind.request_type(), request, &reply, started)
                .await;
            return Ok(reply);
        };

        self.store
            .mark_device_seen(device.id, non_empty(&request.ipaddr), now)
            .await?;
        self.store
            .record_heartbeat(NewHeartbeat {
                site_id: site.id,
                device_id: device.id,
                kind,
                user_name: request.user(),
                channel_num: request.channel(),
                received_at: now,
            })
            .await?;

        let guard = self.locks.acquire(device.id).await;
        self.check_sync(&guard).await;
        let response = self
            .drain(&guard, site.id, ResponseAlarmInfoPlate::default())
            .await;
        drop(guard);

        tracing::debug!(site_code, device_id = device.id, kind = kind.as_str(), "Poll processed");
        let reply = PollReply::Envelope(response.into());
        self.log_response(&site, Some(device.id), kind.request_type(), request, &reply, started)
            .await;
        Ok(reply)
    }

    /// IO input change reported by a camera. Stored for known devices, then acknowledged.
    pub async fn handle_io_trigger(
        &self,
        site_code: &str,
        request: &IoTriggerRequest,
    ) -> Result<DeviceAck> {
        let started = Instant::now();
        let site = self.require_site(site_code).await?;
        let io = &request.alarm_gio_in;
        let trigger = &io.result.trigger_result;

        let device = self
            .store
            .find_device_by_serial(site.id, io.serial_number.trim())
            .await?;
        if let Some(device) = &device {
            self.store
                .record_io_trigger(NewIoTriggerEvent {
                    site_id: site.id,
                    device_id: device.id,
                    source: trigger.source,
                    value: trigger.value,
                    triggered_at: self.clock.now(),
                })
                .await?;
        }
        tracing::info!(
            site_code,
            serialno = %io.serial_number,
            source = trigger.source,
            value = trigger.value,
            known_device = device.is_some(),
            "IO trigger received"
        );

        let reply = DeviceAck::ok("IO trigger received");
        self.log_response(&site, device.map(|d| d.id), "io-trigger", request, &reply, started)
            .await;
        Ok(reply)
    }

    /// Serial port data forwarded by a camera. Stored for known devices, then acknowledged.
    pub async fn handle_serial_data(
        &self,
        site_code: &str,
        request: &SerialDataRequest,
    ) -> Result<DeviceAck> {
        let started = Instant::now();
        let site = self.require_site(site_code).await?;
        let data = &request.serial_data;

        let device = self
            .store
            .find_device_by_serial(site.id, data.serial_number.trim())
            .await?;
        if let Some(device) = &device {
            self.store
                .record_serial_data(NewSerialDataLog {
                    site_id: site.id,
                    device_id: device.id,
                    serial_channel: data.serial_channel,
                    data_base64: data.data.clone(),
                    data_length: data.data_len,
                    received_at: self.clock.now(),
                })
                .await?;
        }
        tracing::info!(
            site_code,
            serialno = %data.serial_number,
            serial_channel = data.serial_channel,
            data_len = data.data_len,
            known_device = device.is_some(),
            "Serial data received"
        );

        let reply = DeviceAck::ok("Serial data received");
        self.log_response(&site, device.map(|d| d.id), "serial-data", request, &reply, started)
            .await;
        Ok(reply)
    }

    async fn require_site(&self, site_code: &str) -> Result<Site> {
        self.store
            .find_site_by_code(site_code)
            .await?
            .ok_or_else(|| {
                tracing::warn!(site_code, "Site not found");
                AppError::NotFound(format!("Site '{}' not found", site_code))
            })
    }

    async fn check_sync(&self, guard: &DeviceGuard) {
        if let Err(e) = self.sync.process_whitelist_sync(guard).await {
            tracing::warn!(device_id = guard.device_id(), error = %e, "Whitelist sync check failed");
        }
    }

    async fn drain(
        &self,
        guard: &DeviceGuard,
        site_id: i32,
        base: ResponseAlarmInfoPlate,
    ) -> ResponseAlarmInfoPlate {
        match self
            .responses
            .build_device_response(guard, site_id, base.clone())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    device_id = guard.device_id(),
                    error = %e,
                    "Failed to drain command queue, answering without commands"
                );
                base
            }
        }
    }

    /// Best-effort audit row; never fails the request.
    async fn log_response<Req: Serialize, Res: Serialize>(
        &self,
        site: &Site,
        device_id: Option<i32>,
        request_type: &str,
        request: &Req,
        response: &Res,
        started: Instant,
    ) {
        let log = NewResponseLog {
            site_id: site.id,
            device_id,
            request_type: request_type.to_string(),
            request_data: serde_json::to_value(request).unwrap_or_default(),
            response_data: serde_json::to_value(response).unwrap_or_default(),
            processing_time_ms: i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.store.record_response_log(log).await {
            tracing::warn!(
                site_id = site.id,
                request_type,
                error = %e,
                "Failed to save response log"
            );
        }
    }
}

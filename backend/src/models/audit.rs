//! Insert-only audit rows written while handling device webhooks.

use chrono::{DateTime, Utc};

/// Heartbeat flavour reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatKind {
    /// Form-encoded periodic heartbeat
    Normal,
    /// JSON comet long-poll
    Comet,
}

impl HeartbeatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatKind::Normal => "normal",
            HeartbeatKind::Comet => "comet",
        }
    }

    /// Request type recorded in the response log.
    pub fn request_type(&self) -> &'static str {
        match self {
            HeartbeatKind::Normal => "heartbeat",
            HeartbeatKind::Comet => "comet-poll",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewHeartbeat {
    pub site_id: i32,
    pub device_id: i32,
    pub kind: HeartbeatKind,
    pub user_name: Option<String>,
    pub channel_num: Option<i32>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlateRecognition {
    pub site_id: i32,
    pub device_id: i32,
    pub plate_id: i32,
    pub license_plate: String,
    pub confidence: i32,
    pub direction: i32,
    pub trigger_type: i32,
    pub is_offline: bool,
    pub recognition_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEntryLog {
    pub site_id: i32,
    pub device_id: i32,
    pub whitelist_id: Option<i32>,
    pub plate_recognition_id: Option<i64>,
    pub license_plate: String,
    pub entry_type: String,
    /// `allowed` or `denied`
    pub entry_status: String,
    pub gate_opened: bool,
    pub entry_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResponseLog {
    pub site_id: i32,
    pub device_id: Option<i32>,
    pub request_type: String,
    pub request_data: serde_json::Value,
    pub response_data: serde_json::Value,
    pub processing_time_ms: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIoTriggerEvent {
    pub site_id: i32,
    pub device_id: i32,
    pub source: i32,
    pub value: i32,
    pub triggered_at: DateTime<Utc>,
}

/// Raw serial port payload; `data_base64` is stored as the camera sent it.
#[derive(Debug, Clone)]
pub struct NewSerialDataLog {
    pub site_id: i32,
    pub device_id: i32,
    pub serial_channel: i32,
    pub data_base64: String,
    pub data_length: i32,
    pub received_at: DateTime<Utc>,
}

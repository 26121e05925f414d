//! Response envelope returned to the cameras.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::command::{OperateType, SerialDataFrame, WhitelistPlate};

/// `info` value that opens the gate.
pub const INFO_OK: &str = "ok";
/// `info` value that keeps the gate closed.
pub const INFO_DENIED: &str = "denied";

/// Top-level wrapper expected by the firmware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LprResponse {
    #[serde(rename = "Response_AlarmInfoPlate")]
    pub response_alarm_info_plate: ResponseAlarmInfoPlate,
}

impl From<ResponseAlarmInfoPlate> for LprResponse {
    fn from(inner: ResponseAlarmInfoPlate) -> Self {
        Self {
            response_alarm_info_plate: inner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResponseAlarmInfoPlate {
    pub info: String,
    pub plateid: i32,
    #[serde(rename = "channelNum")]
    pub channel_num: i32,
    #[serde(rename = "manualTrigger", skip_serializing_if = "Option::is_none")]
    pub manual_trigger: Option<String>,
    #[serde(rename = "TriggerImage", skip_serializing_if = "Option::is_none")]
    pub trigger_image: Option<TriggerImage>,
    #[serde(rename = "serialData", skip_serializing_if = "Option::is_none")]
    pub serial_data: Option<Vec<SerialDataFrame>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_list_operate: Option<WhiteListOperate>,
    #[serde(rename = "ContinuePushOffline", skip_serializing_if = "Option::is_none")]
    pub continue_push_offline: Option<ContinuePushOffline>,
}

impl ResponseAlarmInfoPlate {
    /// Bare acknowledgement with no queued work attached.
    pub fn ack(info: &str, plateid: i32) -> Self {
        Self {
            info: info.to_string(),
            plateid,
            channel_num: 0,
            manual_trigger: None,
            trigger_image: None,
            serial_data: None,
            white_list_operate: None,
            continue_push_offline: None,
        }
    }
}

impl Default for ResponseAlarmInfoPlate {
    fn default() -> Self {
        Self::ack(INFO_OK, 0)
    }
}

/// Asks the camera to upload a snapshot to the given URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TriggerImage {
    pub port: i32,
    #[serde(rename = "snapImageAbsolutelyUrl", skip_serializing_if = "Option::is_none")]
    pub snap_image_absolutely_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WhiteListOperate {
    /// 0 = add, 1 = delete
    pub operate_type: i32,
    pub white_list_data: Vec<WhitelistPlate>,
}

impl WhiteListOperate {
    pub fn new(operate: OperateType, white_list_data: Vec<WhitelistPlate>) -> Self {
        Self {
            operate_type: operate.wire_code(),
            white_list_data,
        }
    }
}

/// Tells the camera whether to keep pushing records it buffered while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContinuePushOffline {
    pub plateid: i32,
    #[serde(rename = "continue")]
    pub continue_push: i32,
}

/// Plain acknowledgement for requests that carry no device instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceAck {
    pub status: String,
    pub message: String,
}

impl DeviceAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
        }
    }

    pub fn no_device() -> Self {
        Self::ok("No device found")
    }
}

//! Payloads pushed by the cameras.
//!
//! Firmware versions differ in which fields they send, so every field is
//! defaulted rather than required.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of the `plate-recognition` webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AlarmInfoPlateRequest {
    #[serde(rename = "AlarmInfoPlate", default)]
    pub alarm_info_plate: AlarmInfoPlate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AlarmInfoPlate {
    pub channel: i32,
    #[serde(rename = "deviceName")]
    pub device_name: String,
    #[serde(rename = "ipaddr")]
    pub ip_address: String,
    pub result: PlateResultContainer,
    #[serde(rename = "serialno")]
    pub serial_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PlateResultContainer {
    #[serde(rename = "PlateResult")]
    pub plate_result: PlateResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PlateResult {
    pub license: String,
    pub confidence: i32,
    #[serde(rename = "colorType")]
    pub color_type: i32,
    #[serde(rename = "type")]
    pub plate_type: i32,
    pub direction: i32,
    #[serde(rename = "triggerType")]
    pub trigger_type: i32,
    pub plateid: i32,
    /// 1 when the record was buffered while the device was offline
    pub isoffline: i32,
    #[serde(rename = "timeStamp")]
    pub time_stamp: TimeStamp,
}

impl PlateResult {
    pub fn is_offline(&self) -> bool {
        self.isoffline == 1
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TimeStamp {
    #[serde(rename = "Timeval")]
    pub timeval: Timeval,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i32,
    pub decyear: i32,
    pub decmon: i32,
    pub decday: i32,
    pub dechour: i32,
    pub decmin: i32,
    pub decsec: i32,
}

impl TimeStamp {
    /// Recognition time reported by the camera.
    ///
    /// Unix seconds win when present; otherwise the broken-down fields are
    /// used, with month and day clamped to 1.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let tv = &self.timeval;
        if tv.sec > 0 {
            return Utc.timestamp_opt(tv.sec, 0).single();
        }
        if tv.decyear > 0 {
            let date = NaiveDate::from_ymd_opt(
                tv.decyear,
                tv.decmon.max(1) as u32,
                tv.decday.max(1) as u32,
            )?;
            let naive = date.and_hms_opt(tv.dechour as u32, tv.decmin as u32, tv.decsec as u32)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
        None
    }
}

/// Form-encoded body of the `heartbeat` webhook.
#[derive(Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct HeartbeatForm {
    pub device_name: String,
    pub ipaddr: String,
    pub port: String,
    pub user_name: String,
    #[serde(skip_serializing)]
    pub pass_wd: String,
    pub serialno: String,
    pub channel_num: String,
}

redacted_debug!(HeartbeatForm {
    show device_name,
    show ipaddr,
    show port,
    show user_name,
    redact pass_wd,
    show serialno,
    show channel_num,
});

impl HeartbeatForm {
    pub fn channel(&self) -> Option<i32> {
        self.channel_num.trim().parse().ok()
    }

    pub fn user(&self) -> Option<String> {
        let name = self.user_name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// JSON body of the `comet-poll` webhook. Same fields as the heartbeat form.
pub type CometPollRequest = HeartbeatForm;

/// Body of the `io-trigger` webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IoTriggerRequest {
    #[serde(rename = "AlarmGioIn", default)]
    pub alarm_gio_in: AlarmGioIn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AlarmGioIn {
    #[serde(rename = "deviceName")]
    pub device_name: String,
    #[serde(rename = "ipaddr")]
    pub ip_address: String,
    pub result: TriggerResultContainer,
    #[serde(rename = "serialno")]
    pub serial_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TriggerResultContainer {
    #[serde(rename = "TriggerResult")]
    pub trigger_result: TriggerResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TriggerResult {
    pub source: i32,
    pub value: i32,
}

/// Body of the `serial-data` webhook: bytes read from the camera's RS485/RS232 port.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SerialDataRequest {
    #[serde(rename = "SerialData", default)]
    pub serial_data: SerialDataPush,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SerialDataPush {
    pub channel: i32,
    #[serde(rename = "serialno")]
    pub serial_number: String,
    #[serde(rename = "ipaddr")]
    pub ip_address: String,
    #[serde(rename = "deviceName")]
    pub device_name: String,
    #[serde(rename = "serialChannel")]
    pub serial_channel: i32,
    /// Base64 as sent by the camera
    pub data: String,
    #[serde(rename = "dataLen")]
    pub data_len: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plate_push() {
        let body = r#"{
            "AlarmInfoPlate": {
                "channel": 0,
                "deviceName": "gate-east",
                "ipaddr": "192.168.1.100",
                "serialno": "e1a2b3c4-5d6e7f80",
                "result": {
                    "PlateResult": {
                        "license": "B 1234 XYZ",
                        "confidence": 92,
                        "plateid": 731,
                        "isoffline": 1,
                        "timeStamp": { "Timeval": { "sec": 1726308000, "usec": 0 } },
                        "imageFile": "ignored"
                    }
                }
            }
        }"#;
        let req: AlarmInfoPlateRequest = serde_json::from_str(body).unwrap();
        let plate = &req.alarm_info_plate.result.plate_result;
        assert_eq!(req.alarm_info_plate.serial_number, "e1a2b3c4-5d6e7f80");
        assert_eq!(plate.license, "B 1234 XYZ");
        assert_eq!(plate.plateid, 731);
        assert!(plate.is_offline());
        assert_eq!(
            plate.time_stamp.to_datetime(),
            Utc.timestamp_opt(1726308000, 0).single()
        );
    }

    #[test]
    fn test_timestamp_from_broken_down_fields() {
        let ts = TimeStamp {
            timeval: Timeval {
                decyear: 2025,
                decmon: 0,
                decday: 14,
                dechour: 9,
                decmin: 5,
                decsec: 30,
                ..Default::default()
            },
        };
        assert_eq!(
            ts.to_datetime(),
            Some(Utc.with_ymd_and_hms(2025, 1, 14, 9, 5, 30).unwrap())
        );
        assert_eq!(TimeStamp::default().to_datetime(), None);
    }

    #[test]
    fn test_parse_serial_data_push() {
        let body = r#"{
            "SerialData": {
                "channel": 0,
                "serialno": "sn-9",
                "ipaddr": "10.0.0.9",
                "deviceName": "gate-west",
                "serialChannel": 1,
                "data": "AQID",
                "dataLen": 3
            }
        }"#;
        let req: SerialDataRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.serial_data.serial_number, "sn-9");
        assert_eq!(req.serial_data.serial_channel, 1);
        assert_eq!(req.serial_data.data, "AQID");
        assert_eq!(req.serial_data.data_len, 3);
    }

    #[test]
    fn test_heartbeat_form_hides_password() {
        let form: HeartbeatForm = serde_json::from_value(serde_json::json!({
            "serialno": "sn-1",
            "pass_wd": "admin123",
            "channel_num": "2"
        }))
        .unwrap();
        assert_eq!(form.channel(), Some(2));
        assert_eq!(form.user(), None);
        assert!(!format!("{:?}", form).contains("admin123"));
        assert!(serde_json::to_value(&form).unwrap().get("pass_wd").is_none());
    }
}

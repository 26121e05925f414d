//! Command queue entries and their typed payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::whitelist::WhitelistEntry;

/// Timestamp format the camera firmware expects in whitelist entries.
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Command types whose name carries this prefix are delivered through `white_list_operate`.
pub const WHITELIST_PREFIX: &str = "whitelist_";

fn default_enable() -> i32 {
    1
}

fn default_port() -> i32 {
    80
}

/// One plate entry of a whitelist command, in the vendor's field naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WhitelistPlate {
    pub plate: String,
    /// 1 = valid, 0 = invalid
    #[serde(default = "default_enable")]
    pub enable: i32,
    /// 1 = blacklist (raise alarm), 0 = whitelist
    #[serde(default)]
    pub need_alarm: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overdue_time: Option<String>,
}

impl WhitelistPlate {
    /// Entry carrying only a plate, used for deletes. An empty plate deletes everything.
    pub fn plate_only(plate: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            enable: 1,
            need_alarm: 0,
            enable_time: None,
            overdue_time: None,
        }
    }

    pub fn from_entry(entry: &WhitelistEntry) -> Self {
        Self {
            plate: entry.license_plate.clone(),
            enable: 1,
            need_alarm: i32::from(entry.is_blacklist),
            enable_time: entry
                .enable_time
                .map(|t| t.format(WIRE_TIME_FORMAT).to_string()),
            overdue_time: entry
                .expiry_time
                .map(|t| t.format(WIRE_TIME_FORMAT).to_string()),
        }
    }
}

/// Raw serial frame forwarded to the device's RS485/RS232 port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SerialDataFrame {
    #[serde(rename = "serialChannel")]
    pub serial_channel: i32,
    /// Base64-encoded bytes
    pub data: String,
    #[serde(rename = "dataLen")]
    pub data_len: i32,
}

/// `operate_type` of a `white_list_operate` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperateType {
    Add,
    Delete,
}

impl OperateType {
    pub fn wire_code(&self) -> i32 {
        match self {
            OperateType::Add => 0,
            OperateType::Delete => 1,
        }
    }
}

/// Command delivered to a device on its next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Delete every whitelist entry stored on the device
    WhitelistClear,
    WhitelistAddBatch { whitelist_data: Vec<WhitelistPlate> },
    WhitelistAdd(WhitelistPlate),
    WhitelistRemove { plate: String },
    GateOpen,
    ManualTrigger,
    Screenshot { port: i32, url: Option<String> },
    ManualCommand { serial_data: Vec<SerialDataFrame> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandDecodeError {
    #[error("unknown command type '{0}'")]
    UnknownType(String),

    #[error("invalid payload for '{command_type}': {reason}")]
    InvalidPayload {
        command_type: String,
        reason: String,
    },
}

#[derive(Deserialize)]
struct BatchPayload {
    #[serde(default)]
    whitelist_data: Vec<WhitelistPlate>,
}

#[derive(Deserialize)]
struct RemovePayload {
    #[serde(default)]
    plate: String,
}

#[derive(Deserialize)]
struct ScreenshotPayload {
    #[serde(default = "default_port")]
    port: i32,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct ManualCommandPayload {
    #[serde(default)]
    serial_data: Vec<SerialDataFrame>,
}

impl DeviceCommand {
    /// Value stored in `command_queue.command_type`.
    pub fn command_type(&self) -> &'static str {
        match self {
            DeviceCommand::WhitelistClear => "whitelist_clear",
            DeviceCommand::WhitelistAddBatch { .. } => "whitelist_add_batch",
            DeviceCommand::WhitelistAdd(_) => "whitelist_add",
            DeviceCommand::WhitelistRemove { .. } => "whitelist_remove",
            DeviceCommand::GateOpen => "gate_open",
            DeviceCommand::ManualTrigger => "manual_trigger",
            DeviceCommand::Screenshot { .. } => "screenshot",
            DeviceCommand::ManualCommand { .. } => "manual_command",
        }
    }

    /// Value stored in `command_queue.command_data`.
    pub fn payload(&self) -> Value {
        match self {
            DeviceCommand::WhitelistClear => json!({ "plate": "" }),
            DeviceCommand::WhitelistAddBatch { whitelist_data } => {
                json!({ "whitelist_data": whitelist_data })
            }
            DeviceCommand::WhitelistAdd(plate) => json!(plate),
            DeviceCommand::WhitelistRemove { plate } => json!({ "plate": plate }),
            DeviceCommand::GateOpen | DeviceCommand::ManualTrigger => json!({}),
            DeviceCommand::Screenshot { port, url } => json!({ "port": port, "url": url }),
            DeviceCommand::ManualCommand { serial_data } => json!({ "serial_data": serial_data }),
        }
    }

    /// Rebuild a command from its stored type and payload.
    pub fn decode(command_type: &str, payload: &Value) -> Result<Self, CommandDecodeError> {
        fn parse<T: serde::de::DeserializeOwned>(
            command_type: &str,
            payload: &Value,
        ) -> Result<T, CommandDecodeError> {
            let payload = if payload.is_null() {
                Value::Object(Default::default())
            } else {
                payload.clone()
            };
            serde_json::from_value(payload).map_err(|e| CommandDecodeError::InvalidPayload {
                command_type: command_type.to_string(),
                reason: e.to_string(),
            })
        }

        let command = match command_type {
            "whitelist_clear" => DeviceCommand::WhitelistClear,
            "whitelist_add_batch" => DeviceCommand::WhitelistAddBatch {
                whitelist_data: parse::<BatchPayload>(command_type, payload)?.whitelist_data,
            },
            "whitelist_add" => DeviceCommand::WhitelistAdd(parse(command_type, payload)?),
            "whitelist_remove" => DeviceCommand::WhitelistRemove {
                plate: parse::<RemovePayload>(command_type, payload)?.plate,
            },
            "gate_open" => DeviceCommand::GateOpen,
            "manual_trigger" => DeviceCommand::ManualTrigger,
            "screenshot" => {
                let p: ScreenshotPayload = parse(command_type, payload)?;
                DeviceCommand::Screenshot {
                    port: p.port,
                    url: p.url,
                }
            }
            "manual_command" => DeviceCommand::ManualCommand {
                serial_data: parse::<ManualCommandPayload>(command_type, payload)?.serial_data,
            },
            other => return Err(CommandDecodeError::UnknownType(other.to_string())),
        };
        Ok(command)
    }

    pub fn is_whitelist(&self) -> bool {
        self.operate_type().is_some()
    }

    /// `Some` for whitelist commands.
    pub fn operate_type(&self) -> Option<OperateType> {
        match self {
            DeviceCommand::WhitelistAdd(_) | DeviceCommand::WhitelistAddBatch { .. } => {
                Some(OperateType::Add)
            }
            DeviceCommand::WhitelistRemove { .. } | DeviceCommand::WhitelistClear => {
                Some(OperateType::Delete)
            }
            _ => None,
        }
    }

    /// Plate entries this command contributes to `white_list_data`.
    pub fn whitelist_entries(&self) -> Vec<WhitelistPlate> {
        match self {
            DeviceCommand::WhitelistClear => vec![WhitelistPlate::plate_only("")],
            DeviceCommand::WhitelistAddBatch { whitelist_data } => whitelist_data.clone(),
            DeviceCommand::WhitelistAdd(plate) => vec![plate.clone()],
            DeviceCommand::WhitelistRemove { plate } => vec![WhitelistPlate::plate_only(plate)],
            _ => Vec::new(),
        }
    }
}

/// Row of the `command_queue` table.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct CommandEntry {
    pub id: i64,
    pub site_id: i32,
    pub device_id: i32,
    pub command_type: String,
    #[schema(value_type = Object)]
    pub command_data: Value,
    pub priority: i32,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl CommandEntry {
    pub fn is_whitelist_type(&self) -> bool {
        self.command_type.starts_with(WHITELIST_PREFIX)
    }

    pub fn decode(&self) -> Result<DeviceCommand, CommandDecodeError> {
        DeviceCommand::decode(&self.command_type, &self.command_data)
    }
}

/// Insert request for the command queue.
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub site_id: i32,
    pub device_id: i32,
    pub command: DeviceCommand,
    /// Lower values are delivered first
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clear_payload_is_empty_plate() {
        let cmd = DeviceCommand::WhitelistClear;
        assert_eq!(cmd.command_type(), "whitelist_clear");
        assert_eq!(cmd.payload(), json!({ "plate": "" }));
        assert_eq!(cmd.operate_type(), Some(OperateType::Delete));
        assert_eq!(cmd.whitelist_entries(), vec![WhitelistPlate::plate_only("")]);
    }

    #[test]
    fn test_decode_batch_payload() {
        let payload = json!({
            "whitelist_data": [
                { "plate": "ABC123", "enable": 1, "need_alarm": 0, "enable_time": "2025-01-01 00:00:00" },
                { "plate": "XYZ789" }
            ]
        });
        let cmd = DeviceCommand::decode("whitelist_add_batch", &payload).unwrap();
        let entries = cmd.whitelist_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].enable_time.as_deref(), Some("2025-01-01 00:00:00"));
        assert_eq!(entries[1].enable, 1);
        assert_eq!(entries[1].need_alarm, 0);
        assert_eq!(cmd.operate_type(), Some(OperateType::Add));
    }

    #[test]
    fn test_decode_screenshot_defaults_port() {
        let cmd =
            DeviceCommand::decode("screenshot", &json!({ "url": "http://srv/snap" })).unwrap();
        assert_eq!(
            cmd,
            DeviceCommand::Screenshot {
                port: 80,
                url: Some("http://srv/snap".into())
            }
        );
        assert!(!cmd.is_whitelist());
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = DeviceCommand::decode("reboot", &json!({})).unwrap_err();
        assert_eq!(err, CommandDecodeError::UnknownType("reboot".into()));
    }

    #[test]
    fn test_decode_invalid_payload() {
        let err = DeviceCommand::decode("whitelist_add", &json!({ "enable": 1 })).unwrap_err();
        assert!(matches!(err, CommandDecodeError::InvalidPayload { .. }));
    }

    #[test]
    fn test_null_payload_accepted_for_unit_commands() {
        assert_eq!(
            DeviceCommand::decode("gate_open", &Value::Null).unwrap(),
            DeviceCommand::GateOpen
        );
        assert_eq!(
            DeviceCommand::decode("whitelist_remove", &Value::Null).unwrap(),
            DeviceCommand::WhitelistRemove { plate: String::new() }
        );
    }

    #[test]
    fn test_plate_from_entry_formats_times() {
        let entry = WhitelistEntry {
            id: 1,
            site_id: 1,
            device_id: None,
            license_plate: "B1234XYZ".into(),
            entry_type: "tenant".into(),
            is_enabled: true,
            is_blacklist: false,
            enable_time: Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()),
            expiry_time: None,
            current_entries: 0,
        };
        let plate = WhitelistPlate::from_entry(&entry);
        assert_eq!(plate.enable_time.as_deref(), Some("2025-03-01 08:30:00"));
        assert_eq!(plate.need_alarm, 0);

        let wire = serde_json::to_value(&plate).unwrap();
        assert!(wire.get("overdue_time").is_none());
    }

    #[test]
    fn test_serial_frame_wire_names() {
        let frame = SerialDataFrame {
            serial_channel: 0,
            data: "AQID".into(),
            data_len: 3,
        };
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire, json!({ "serialChannel": 0, "data": "AQID", "dataLen": 3 }));
    }
}

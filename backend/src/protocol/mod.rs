//! Vendor wire protocol spoken by the LPR cameras.
//!
//! Field names follow the camera firmware exactly and must not be renamed.

pub mod request;
pub mod response;

pub use request::{AlarmInfoPlateRequest, CometPollRequest, HeartbeatForm, IoTriggerRequest};
pub use response::{DeviceAck, LprResponse, ResponseAlarmInfoPlate};

//! LPR Gateway - Backend Library
//!
//! Webhook backend for LPR gate cameras: entry decisions, the per-device
//! command queue, and whitelist bulk sync delivered through poll responses.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod protocol;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};

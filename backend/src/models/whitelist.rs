//! Whitelist model. Rows are owned by the CRUD layer; the sync machine only reads them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Whitelist (or blacklist) entry for a site.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WhitelistEntry {
    pub id: i32,
    pub site_id: i32,
    /// `None` applies the entry to every device of the site.
    pub device_id: Option<i32>,
    pub license_plate: String,
    pub entry_type: String,
    pub is_enabled: bool,
    pub is_blacklist: bool,
    pub enable_time: Option<DateTime<Utc>>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub current_entries: i32,
}

impl WhitelistEntry {
    /// Whether the entry takes part in a device bulk sync.
    pub fn is_sync_eligible(&self) -> bool {
        self.is_enabled && !self.is_blacklist
    }
}

/// Canonical plate form used for matching: no whitespace, uppercase.
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

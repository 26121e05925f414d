//! Device model and its whitelist-sync register.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;
use utoipa::ToSchema;

/// Whitelist sync machine state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Clearing,
    Adding,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Clearing => "clearing",
            SyncStatus::Adding => "adding",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    /// Decode the nullable `whitelist_sync_status` column. NULL and unknown values read as idle.
    pub fn from_db(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("idle") => SyncStatus::Idle,
            Some("clearing") => SyncStatus::Clearing,
            Some("adding") => SyncStatus::Adding,
            Some("completed") => SyncStatus::Completed,
            Some("failed") => SyncStatus::Failed,
            Some(other) => {
                tracing::warn!(status = other, "Unknown whitelist sync status, treating as idle");
                SyncStatus::Idle
            }
        }
    }

    /// Column value; idle is stored as NULL.
    pub fn to_db(&self) -> Option<&'static str> {
        match self {
            SyncStatus::Idle => None,
            other => Some(other.as_str()),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, SyncStatus::Clearing | SyncStatus::Adding)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device whitelist sync register.
///
/// Fields are private: the register only moves through the transition methods,
/// which are crate-internal and driven by the whitelist sync service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSyncState {
    enabled: bool,
    status: SyncStatus,
    started_at: Option<DateTime<Utc>>,
    batches_sent: i32,
    total_batches: i32,
}

impl DeviceSyncState {
    /// Rehydrate a register from persisted columns.
    pub fn from_parts(
        enabled: bool,
        status: SyncStatus,
        started_at: Option<DateTime<Utc>>,
        batches_sent: i32,
        total_batches: i32,
    ) -> Self {
        Self {
            enabled,
            status,
            started_at,
            batches_sent,
            total_batches,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn batches_sent(&self) -> i32 {
        self.batches_sent
    }

    pub fn total_batches(&self) -> i32 {
        self.total_batches
    }

    pub fn is_in_progress(&self) -> bool {
        self.status.is_in_progress()
    }

    /// True when a run in progress has exceeded `timeout` since it started.
    pub fn has_timed_out(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if !self.is_in_progress() {
            return false;
        }
        match (self.started_at, chrono::Duration::from_std(timeout)) {
            (Some(started), Ok(limit)) => now - started > limit,
            _ => false,
        }
    }

    /// All batches of the current run have been queued.
    pub fn all_batches_sent(&self) -> bool {
        self.batches_sent >= self.total_batches
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_batches > 0 {
            self.batches_sent as f64 / self.total_batches as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Operator request for a fresh run.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            enabled: true,
            ..Self::default()
        };
    }

    /// Idle -> Clearing.
    pub(crate) fn start(&mut self, total_batches: i32, now: DateTime<Utc>) {
        self.status = SyncStatus::Clearing;
        self.started_at = Some(now);
        self.batches_sent = 0;
        self.total_batches = total_batches;
    }

    /// Clearing -> Adding.
    pub(crate) fn begin_adding(&mut self) {
        self.status = SyncStatus::Adding;
        self.batches_sent = 0;
    }

    pub(crate) fn record_batch_sent(&mut self) {
        self.batches_sent += 1;
    }

    pub(crate) fn complete(&mut self) {
        *self = Self {
            enabled: false,
            status: SyncStatus::Completed,
            ..Self::default()
        };
    }

    /// Counters are kept so the projection shows how far the run got.
    pub(crate) fn fail(&mut self) {
        self.enabled = false;
        self.status = SyncStatus::Failed;
        self.started_at = None;
    }
}

/// LPR camera / gate controller registered to a site.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: i32,
    pub site_id: i32,
    pub serial_number: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub is_online: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub sync: DeviceSyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row type for sqlx::query_as, maps directly to the devices table columns.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct DeviceRow {
    pub id: i32,
    pub site_id: i32,
    pub serial_number: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub is_online: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub whitelist_start_sync: bool,
    pub whitelist_sync_status: Option<String>,
    pub whitelist_sync_started_at: Option<DateTime<Utc>>,
    pub whitelist_sync_batches_sent: i32,
    pub whitelist_sync_total_batches: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            site_id: row.site_id,
            serial_number: row.serial_number,
            device_name: row.device_name,
            ip_address: row.ip_address,
            is_online: row.is_online,
            last_heartbeat: row.last_heartbeat,
            sync: DeviceSyncState::from_parts(
                row.whitelist_start_sync,
                SyncStatus::from_db(row.whitelist_sync_status.as_deref()),
                row.whitelist_sync_started_at,
                row.whitelist_sync_batches_sent,
                row.whitelist_sync_total_batches,
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 14, 10, 0, 0).unwrap()
    }

    const THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn test_status_db_roundtrip() {
        for status in [
            SyncStatus::Idle,
            SyncStatus::Clearing,
            SyncStatus::Adding,
            SyncStatus::Completed,
            SyncStatus::Failed,
        ] {
            assert_eq!(SyncStatus::from_db(status.to_db()), status);
        }
        assert_eq!(SyncStatus::from_db(Some("idle")), SyncStatus::Idle);
        assert_eq!(SyncStatus::from_db(Some("bogus")), SyncStatus::Idle);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::Clearing).unwrap(),
            "\"clearing\""
        );
    }

    #[test]
    fn test_reset_enables_and_clears() {
        let mut state = DeviceSyncState::from_parts(false, SyncStatus::Failed, Some(t0()), 2, 4);
        state.reset();
        assert!(state.enabled());
        assert_eq!(state.status(), SyncStatus::Idle);
        assert_eq!(state.started_at(), None);
        assert_eq!((state.batches_sent(), state.total_batches()), (0, 0));
    }

    #[test]
    fn test_full_run_transitions() {
        let mut state = DeviceSyncState::default();
        state.reset();
        state.start(2, t0());
        assert_eq!(state.status(), SyncStatus::Clearing);
        assert!(state.is_in_progress());

        state.begin_adding();
        assert_eq!(state.status(), SyncStatus::Adding);
        state.record_batch_sent();
        assert!(!state.all_batches_sent());
        assert_eq!(state.progress_percent(), 50.0);
        state.record_batch_sent();
        assert!(state.all_batches_sent());

        state.complete();
        assert_eq!(state.status(), SyncStatus::Completed);
        assert!(!state.enabled());
        assert_eq!(state.started_at(), None);
        assert_eq!(state.total_batches(), 0);
    }

    #[test]
    fn test_fail_disables_and_keeps_progress() {
        let mut state = DeviceSyncState::default();
        state.reset();
        state.start(3, t0());
        state.begin_adding();
        state.record_batch_sent();
        state.fail();
        assert_eq!(state.status(), SyncStatus::Failed);
        assert!(!state.enabled());
        assert_eq!(state.started_at(), None);
        assert_eq!(state.batches_sent(), 1);
    }

    #[test]
    fn test_timeout_only_while_in_progress() {
        let mut state = DeviceSyncState::default();
        state.reset();
        state.start(1, t0());

        let just_inside = t0() + chrono::Duration::minutes(30);
        let past = t0() + chrono::Duration::minutes(31);
        assert!(!state.has_timed_out(just_inside, THIRTY_MINUTES));
        assert!(state.has_timed_out(past, THIRTY_MINUTES));

        state.complete();
        assert!(!state.has_timed_out(past, THIRTY_MINUTES));
    }

    #[test]
    fn test_progress_zero_without_batches() {
        let state = DeviceSyncState::from_parts(true, SyncStatus::Adding, Some(t0()), 0, 0);
        assert_eq!(state.progress_percent(), 0.0);
        assert!(state.all_batches_sent());
    }
}

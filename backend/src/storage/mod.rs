//! Persistence backends.
//!
//! Services only talk to [`LprStore`]; `postgres` is the production backend and
//! `memory` backs local development (`DATABASE_URL=memory://`) and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::audit::{
    NewEntryLog, NewHeartbeat, NewIoTriggerEvent, NewPlateRecognition, NewResponseLog,
    NewSerialDataLog,
};
use crate::models::command::{CommandEntry, NewCommand};
use crate::models::device::{Device, DeviceSyncState};
use crate::models::site::Site;
use crate::models::whitelist::WhitelistEntry;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// What the device presented about itself on a webhook.
#[derive(Debug, Clone, Default)]
pub struct DeviceSighting<'a> {
    pub serial_number: &'a str,
    pub device_name: Option<&'a str>,
    pub ip_address: Option<&'a str>,
}

/// Store backend trait
#[async_trait]
pub trait LprStore: Send + Sync {
    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    async fn find_site_by_code(&self, site_code: &str) -> Result<Option<Site>>;

    async fn get_device(&self, device_id: i32) -> Result<Option<Device>>;

    async fn find_device_by_serial(&self, site_id: i32, serial_number: &str)
        -> Result<Option<Device>>;

    /// Find the device by serial or register it, then mark it online.
    async fn upsert_device_seen(
        &self,
        site_id: i32,
        sighting: DeviceSighting<'_>,
        at: DateTime<Utc>,
    ) -> Result<Device>;

    /// Mark an existing device online and stamp its heartbeat time.
    async fn mark_device_seen(
        &self,
        device_id: i32,
        ip_address: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Devices of a site ordered by id.
    async fn list_site_devices(&self, site_id: i32) -> Result<Vec<Device>>;

    /// Persist the sync register and, when given, enqueue the command produced
    /// by the same transition. Both writes land together or not at all.
    async fn commit_sync_step(
        &self,
        device_id: i32,
        state: &DeviceSyncState,
        command: Option<NewCommand>,
    ) -> Result<Option<CommandEntry>>;

    /// Persist the sync register alone.
    async fn save_sync_state(&self, device_id: i32, state: &DeviceSyncState) -> Result<()> {
        self.commit_sync_step(device_id, state, None).await?;
        Ok(())
    }

    /// Count of enabled, non-blacklist whitelist rows for a site.
    async fn count_sync_whitelist(&self, site_id: i32) -> Result<i64>;

    /// Page of enabled, non-blacklist whitelist rows ordered by id.
    async fn sync_whitelist_page(
        &self,
        site_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<WhitelistEntry>>;

    /// Enabled row whose plate, stripped of whitespace and uppercased, equals `normalized_plate`.
    async fn find_active_whitelist_by_plate(
        &self,
        site_id: i32,
        normalized_plate: &str,
    ) -> Result<Option<WhitelistEntry>>;

    async fn increment_whitelist_entries(&self, whitelist_id: i32) -> Result<()>;

    async fn insert_command(&self, command: NewCommand) -> Result<CommandEntry>;

    /// Unprocessed commands for a device ordered by priority, then creation time.
    async fn pending_commands(&self, device_id: i32, limit: Option<i64>)
        -> Result<Vec<CommandEntry>>;

    /// Mark commands processed. Rows already processed are left untouched;
    /// returns how many rows were flipped.
    async fn mark_processed(&self, command_ids: &[i64], at: DateTime<Utc>) -> Result<u64>;

    async fn record_heartbeat(&self, heartbeat: NewHeartbeat) -> Result<()>;

    async fn record_plate_recognition(&self, recognition: NewPlateRecognition) -> Result<i64>;

    async fn record_entry_log(&self, entry: NewEntryLog) -> Result<i64>;

    async fn record_response_log(&self, log: NewResponseLog) -> Result<()>;

    async fn record_io_trigger(&self, event: NewIoTriggerEvent) -> Result<()>;

    async fn record_serial_data(&self, log: NewSerialDataLog) -> Result<()>;
}

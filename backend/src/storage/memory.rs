//! In-memory store for local development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{DeviceSighting, LprStore};
use crate::error::{AppError, Result};
use crate::models::audit::{
    NewEntryLog, NewHeartbeat, NewIoTriggerEvent, NewPlateRecognition, NewResponseLog,
    NewSerialDataLog,
};
use crate::models::command::{CommandEntry, NewCommand};
use crate::models::device::{Device, DeviceSyncState};
use crate::models::site::Site;
use crate::models::whitelist::{normalize_plate, WhitelistEntry};

#[derive(Default)]
struct Tables {
    sites: BTreeMap<i32, Site>,
    devices: BTreeMap<i32, Device>,
    whitelists: BTreeMap<i32, WhitelistEntry>,
    commands: BTreeMap<i64, CommandEntry>,
    heartbeats: Vec<NewHeartbeat>,
    recognitions: Vec<NewPlateRecognition>,
    entry_logs: Vec<NewEntryLog>,
    response_logs: Vec<NewResponseLog>,
    io_triggers: Vec<NewIoTriggerEvent>,
    serial_data: Vec<NewSerialDataLog>,
    next_site_id: i32,
    next_device_id: i32,
    next_whitelist_id: i32,
    next_command_id: i64,
}

impl Tables {
    fn insert_command(&mut self, command: &NewCommand) -> CommandEntry {
        self.next_command_id += 1;
        let entry = CommandEntry {
            id: self.next_command_id,
            site_id: command.site_id,
            device_id: command.device_id,
            command_type: command.command.command_type().to_string(),
            command_data: command.command.payload(),
            priority: command.priority,
            is_processed: false,
            created_at: command.created_at,
            processed_at: None,
        };
        self.commands.insert(entry.id, entry.clone());
        entry
    }

    fn sync_rows(&self, site_id: i32) -> impl Iterator<Item = &WhitelistEntry> {
        self.whitelists
            .values()
            .filter(move |w| w.site_id == site_id && w.is_sync_eligible())
    }
}

/// [`LprStore`] holding every table in process memory.
///
/// Besides the trait, it exposes seeding and inspection helpers for tests and
/// for running the gateway without a database.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_response_logs: AtomicBool,
    fail_whitelist_pages: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_site(&self, site_code: &str, site_name: &str) -> Site {
        let mut t = self.tables.write().await;
        t.next_site_id += 1;
        let now = Utc::now();
        let site = Site {
            id: t.next_site_id,
            site_code: site_code.to_string(),
            site_name: site_name.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.sites.insert(site.id, site.clone());
        site
    }

    pub async fn insert_device(&self, site_id: i32, serial_number: &str) -> Device {
        let mut t = self.tables.write().await;
        t.next_device_id += 1;
        let now = Utc::now();
        let device = Device {
            id: t.next_device_id,
            site_id,
            serial_number: serial_number.to_string(),
            device_name: None,
            ip_address: None,
            is_online: false,
            last_heartbeat: None,
            sync: DeviceSyncState::default(),
            created_at: now,
            updated_at: now,
        };
        t.devices.insert(device.id, device.clone());
        device
    }

    /// Insert a whitelist row; the given `id` is replaced by the next free one.
    pub async fn insert_whitelist(&self, mut entry: WhitelistEntry) -> WhitelistEntry {
        let mut t = self.tables.write().await;
        t.next_whitelist_id += 1;
        entry.id = t.next_whitelist_id;
        t.whitelists.insert(entry.id, entry.clone());
        entry
    }

    pub async fn set_sync_state(&self, device_id: i32, state: DeviceSyncState) -> Result<()> {
        self.save_sync_state(device_id, &state).await
    }

    /// Every queued command, processed or not, in insertion order.
    pub async fn commands(&self) -> Vec<CommandEntry> {
        self.tables.read().await.commands.values().cloned().collect()
    }

    pub async fn whitelist(&self, whitelist_id: i32) -> Option<WhitelistEntry> {
        self.tables.read().await.whitelists.get(&whitelist_id).cloned()
    }

    pub async fn heartbeats(&self) -> Vec<NewHeartbeat> {
        self.tables.read().await.heartbeats.clone()
    }

    pub async fn recognitions(&self) -> Vec<NewPlateRecognition> {
        self.tables.read().await.recognitions.clone()
    }

    pub async fn entry_logs(&self) -> Vec<NewEntryLog> {
        self.tables.read().await.entry_logs.clone()
    }

    pub async fn response_logs(&self) -> Vec<NewResponseLog> {
        self.tables.read().await.response_logs.clone()
    }

    pub async fn io_triggers(&self) -> Vec<NewIoTriggerEvent> {
        self.tables.read().await.io_triggers.clone()
    }

    pub async fn serial_data_logs(&self) -> Vec<NewSerialDataLog> {
        self.tables.read().await.serial_data.clone()
    }

    /// Make `record_response_log` fail, to exercise best-effort audit paths.
    pub fn fail_response_logs(&self, fail: bool) {
        self.fail_response_logs.store(fail, Ordering::SeqCst);
    }

    /// Make `sync_whitelist_page` fail, to exercise a sync step that cannot read.
    pub fn fail_whitelist_pages(&self, fail: bool) {
        self.fail_whitelist_pages.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LprStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_site_by_code(&self, site_code: &str) -> Result<Option<Site>> {
        let t = self.tables.read().await;
        Ok(t.sites.values().find(|s| s.site_code == site_code).cloned())
    }

    async fn get_device(&self, device_id: i32) -> Result<Option<Device>> {
        Ok(self.tables.read().await.devices.get(&device_id).cloned())
    }

    async fn find_device_by_serial(
        &self,
        site_id: i32,
        serial_number: &str,
    ) -> Result<Option<Device>> {
        let t = self.tables.read().await;
        Ok(t.devices
            .values()
            .find(|d| d.site_id == site_id && d.serial_number == serial_number)
            .cloned())
    }

    async fn upsert_device_seen(
        &self,
        site_id: i32,
        sighting: DeviceSighting<'_>,
        at: DateTime<Utc>,
    ) -> Result<Device> {
        let mut t = self.tables.write().await;
        let existing = t
            .devices
            .values()
            .find(|d| d.site_id == site_id && d.serial_number == sighting.serial_number)
            .map(|d| d.id);

        let id = match existing {
            Some(id) => id,
            None => {
                t.next_device_id += 1;
                let device = Device {
                    id: t.next_device_id,
                    site_id,
                    serial_number: sighting.serial_number.to_string(),
                    device_name: sighting.device_name.map(str::to_string),
                    ip_address: None,
                    is_online: false,
                    last_heartbeat: None,
                    sync: DeviceSyncState::default(),
                    created_at: at,
                    updated_at: at,
                };
                t.devices.insert(device.id, device);
                t.next_device_id
            }
        };

        let device = t
            .devices
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal(format!("Device {} vanished", id)))?;
        device.is_online = true;
        device.last_heartbeat = Some(at);
        device.updated_at = at;
        if let Some(ip) = sighting.ip_address {
            device.ip_address = Some(ip.to_string());
        }
        if device.device_name.is_none() {
            device.device_name = sighting.device_name.map(str::to_string);
        }
        Ok(device.clone())
    }

    async fn mark_device_seen(
        &self,
        device_id: i32,
        ip_address: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(device) = t.devices.get_mut(&device_id) {
            device.is_online = true;
            device.last_heartbeat = Some(at);
            device.updated_at = at;
            if let Some(ip) = ip_address {
                device.ip_address = Some(ip.to_string());
            }
        }
        Ok(())
    }

    async fn list_site_devices(&self, site_id: i32) -> Result<Vec<Device>> {
        let t = self.tables.read().await;
        Ok(t.devices
            .values()
            .filter(|d| d.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn commit_sync_step(
        &self,
        device_id: i32,
        state: &DeviceSyncState,
        command: Option<NewCommand>,
    ) -> Result<Option<CommandEntry>> {
        let mut t = self.tables.write().await;
        let device = t
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| AppError::NotFound(format!("Device {} not found", device_id)))?;
        device.sync = state.clone();
        device.updated_at = Utc::now();
        Ok(command.map(|c| t.insert_command(&c)))
    }

    async fn count_sync_whitelist(&self, site_id: i32) -> Result<i64> {
        Ok(self.tables.read().await.sync_rows(site_id).count() as i64)
    }

    async fn sync_whitelist_page(
        &self,
        site_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<WhitelistEntry>> {
        if self.fail_whitelist_pages.load(Ordering::SeqCst) {
            return Err(AppError::Internal("whitelist page unavailable".into()));
        }
        let t = self.tables.read().await;
        Ok(t.sync_rows(site_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_active_whitelist_by_plate(
        &self,
        site_id: i32,
        normalized_plate: &str,
    ) -> Result<Option<WhitelistEntry>> {
        let t = self.tables.read().await;
        Ok(t.whitelists
            .values()
            .find(|w| {
                w.site_id == site_id
                    && w.is_enabled
                    && normalize_plate(&w.license_plate) == normalized_plate
            })
            .cloned())
    }

    async fn increment_whitelist_entries(&self, whitelist_id: i32) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(entry) = t.whitelists.get_mut(&whitelist_id) {
            entry.current_entries += 1;
        }
        Ok(())
    }

    async fn insert_command(&self, command: NewCommand) -> Result<CommandEntry> {
        let mut t = self.tables.write().await;
        if !t.devices.contains_key(&command.device_id) {
            return Err(AppError::NotFound(format!(
                "Device {} not found",
                command.device_id
            )));
        }
        Ok(t.insert_command(&command))
    }

    async fn pending_commands(
        &self,
        device_id: i32,
        limit: Option<i64>,
    ) -> Result<Vec<CommandEntry>> {
        let t = self.tables.read().await;
        let mut pending: Vec<CommandEntry> = t
            .commands
            .values()
            .filter(|c| c.device_id == device_id && !c.is_processed)
            .cloned()
            .collect();
        pending.sort_by_key(|c| (c.priority, c.created_at, c.id));
        if let Some(limit) = limit {
            pending.truncate(limit.max(0) as usize);
        }
        Ok(pending)
    }

    async fn mark_processed(&self, command_ids: &[i64], at: DateTime<Utc>) -> Result<u64> {
        let mut t = self.tables.write().await;
        let mut flipped = 0;
        for id in command_ids {
            if let Some(entry) = t.commands.get_mut(id) {
                if !entry.is_processed {
                    entry.is_processed = true;
                    entry.processed_at = Some(at);
                    flipped += 1;
                }
            }
        }
        Ok(flipped)
    }

    async fn record_heartbeat(&self, heartbeat: NewHeartbeat) -> Result<()> {
        self.tables.write().await.heartbeats.push(heartbeat);
        Ok(())
    }

    async fn record_plate_recognition(&self, recognition: NewPlateRecognition) -> Result<i64> {
        let mut t = self.tables.write().await;
        t.recognitions.push(recognition);
        Ok(t.recognitions.len() as i64)
    }

    async fn record_entry_log(&self, entry: NewEntryLog) -> Result<i64> {
        let mut t = self.tables.write().await;
        t.entry_logs.push(entry);
        Ok(t.entry_logs.len() as i64)
    }

    async fn record_response_log(&self, log: NewResponseLog) -> Result<()> {
        if self.fail_response_logs.load(Ordering::SeqCst) {
            return Err(AppError::Internal("response log unavailable".into()));
        }
        self.tables.write().await.response_logs.push(log);
        Ok(())
    }

    async fn record_io_trigger(&self, event: NewIoTriggerEvent) -> Result<()> {
        self.tables.write().await.io_triggers.push(event);
        Ok(())
    }

    async fn record_serial_data(&self, log: NewSerialDataLog) -> Result<()> {
        self.tables.write().await.serial_data.push(log);
        Ok(())
    }
}

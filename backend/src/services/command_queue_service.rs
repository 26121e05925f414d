//! Command queue producer and inspection.
//!
//! Commands wait in `command_queue` until the device polls; the response
//! builder consumes them. Nothing here marks a command delivered except
//! [`CommandQueueService::mark_consumed`].

use std::sync::Arc;

use crate::config::SyncSettings;
use crate::error::{AppError, Result};
use crate::models::command::{CommandEntry, DeviceCommand, NewCommand};
use crate::models::device::Device;
use crate::services::clock::Clock;
use crate::services::metrics_service;
use crate::storage::LprStore;

/// Priority used when the producer does not pick one. Lower is delivered first.
pub const DEFAULT_PRIORITY: i32 = 1;

pub struct CommandQueueService {
    store: Arc<dyn LprStore>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl CommandQueueService {
    pub fn new(store: Arc<dyn LprStore>, clock: Arc<dyn Clock>, settings: SyncSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Build an insert request stamped with the current time.
    pub fn new_command(&self, device: &Device, command: DeviceCommand, priority: i32) -> NewCommand {
        NewCommand {
            site_id: device.site_id,
            device_id: device.id,
            command,
            priority,
            created_at: self.clock.now(),
        }
    }

    /// Reject commands the device could never accept.
    pub fn validate(&self, command: &DeviceCommand) -> Result<()> {
        match command {
            DeviceCommand::WhitelistAddBatch { whitelist_data } => {
                if whitelist_data.is_empty() {
                    return Err(AppError::Validation(
                        "whitelist_add_batch requires at least one entry".into(),
                    ));
                }
                if whitelist_data.len() > self.settings.operate_limit {
                    return Err(AppError::Validation(format!(
                        "whitelist_add_batch carries {} entries, the device accepts at most {}",
                        whitelist_data.len(),
                        self.settings.operate_limit
                    )));
                }
                if whitelist_data.iter().any(|p| p.plate.trim().is_empty()) {
                    return Err(AppError::Validation(
                        "whitelist_add_batch entries need a plate".into(),
                    ));
                }
            }
            DeviceCommand::WhitelistAdd(plate) if plate.plate.trim().is_empty() => {
                return Err(AppError::Validation("whitelist_add requires a plate".into()));
            }
            DeviceCommand::WhitelistRemove { plate } if plate.trim().is_empty() => {
                return Err(AppError::Validation(
                    "whitelist_remove requires a plate; use whitelist_clear to delete everything"
                        .into(),
                ));
            }
            DeviceCommand::ManualCommand { serial_data } if serial_data.is_empty() => {
                return Err(AppError::Validation(
                    "manual_command requires serial_data".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Append a command to a device's queue. No deduplication.
    pub async fn enqueue(
        &self,
        device: &Device,
        command: DeviceCommand,
        priority: i32,
    ) -> Result<CommandEntry> {
        self.validate(&command)?;
        let entry = self
            .store
            .insert_command(self.new_command(device, command, priority))
            .await?;

        metrics_service::record_command_enqueued(&entry.command_type);
        tracing::info!(
            device_id = device.id,
            command_id = entry.id,
            command_type = %entry.command_type,
            priority,
            "Queued command"
        );
        Ok(entry)
    }

    /// Operator-facing enqueue addressed by site code.
    pub async fn enqueue_for_site(
        &self,
        site_code: &str,
        device_id: i32,
        command: DeviceCommand,
        priority: Option<i32>,
    ) -> Result<CommandEntry> {
        let device = self.site_device(site_code, device_id).await?;
        self.enqueue(&device, command, priority.unwrap_or(DEFAULT_PRIORITY))
            .await
    }

    /// Unprocessed commands in delivery order. Does not mark anything.
    pub async fn drain_pending(&self, device_id: i32, limit: Option<i64>) -> Result<Vec<CommandEntry>> {
        self.store.pending_commands(device_id, limit).await
    }

    pub async fn list_pending_for_site(
        &self,
        site_code: &str,
        device_id: i32,
    ) -> Result<Vec<CommandEntry>> {
        let device = self.site_device(site_code, device_id).await?;
        self.drain_pending(device.id, None).await
    }

    /// Flip the given commands to processed. Already processed rows are skipped.
    pub async fn mark_consumed(&self, command_ids: &[i64]) -> Result<u64> {
        if command_ids.is_empty() {
            return Ok(0);
        }
        self.store.mark_processed(command_ids, self.clock.now()).await
    }

    async fn site_device(&self, site_code: &str, device_id: i32) -> Result<Device> {
        let site = self
            .store
            .find_site_by_code(site_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Site '{}' not found", site_code)))?;
        self.store
            .get_device(device_id)
            .await?
            .filter(|d| d.site_id == site.id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Device '{}' not found in site '{}'",
                    device_id, site_code
                ))
            })
    }
}

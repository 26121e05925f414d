//! Per-device whitelist bulk sync.
//!
//! A run clears the device's whitelist, then pushes the site's eligible rows in
//! fixed-size pages, one page per device poll:
//!
//! ```text
//! Idle --start--> Clearing --clear delivered--> Adding --last page delivered--> Completed
//!                    \                             \
//!                     +------ timeout / cancel -----+--> Failed
//! ```
//!
//! [`WhitelistSyncService::process_whitelist_sync`] runs before the response is
//! built and may start a run. [`WhitelistSyncService::process_next_sync_step`]
//! runs after whitelist commands were handed to the device and advances it.
//! Both require the device lock.

use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::SyncSettings;
use crate::error::{AppError, Result};
use crate::models::command::{DeviceCommand, NewCommand, WhitelistPlate};
use crate::models::device::{Device, DeviceSyncState, SyncStatus};
use crate::services::clock::Clock;
use crate::services::command_queue_service::DEFAULT_PRIORITY;
use crate::services::device_lock::{DeviceGuard, DeviceLocks};
use crate::services::event_bus::EventBus;
use crate::services::metrics_service;
use crate::storage::LprStore;

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    TimedOut,
    Cancelled,
}

impl FailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::TimedOut => "Sync timed out",
            FailureReason::Cancelled => "Cancelled by user",
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            FailureReason::TimedOut => "timeout",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

/// Read-only projection of a device's sync register.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SyncStatusView {
    pub device_id: i32,
    pub enabled: bool,
    pub status: SyncStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub batches_sent: i32,
    pub total_batches: i32,
    /// batches_sent / total_batches * 100, or 0 without batches
    pub progress: f64,
}

impl SyncStatusView {
    pub fn of(device_id: i32, state: &DeviceSyncState) -> Self {
        Self {
            device_id,
            enabled: state.enabled(),
            status: state.status(),
            started_at: state.started_at(),
            batches_sent: state.batches_sent(),
            total_batches: state.total_batches(),
            progress: state.progress_percent(),
        }
    }
}

/// Status row for the site-wide listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceSyncSummary {
    pub serial_number: String,
    pub device_name: Option<String>,
    pub is_online: bool,
    pub sync: SyncStatusView,
}

pub struct WhitelistSyncService {
    store: Arc<dyn LprStore>,
    locks: Arc<DeviceLocks>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl WhitelistSyncService {
    pub fn new(
        store: Arc<dyn LprStore>,
        locks: Arc<DeviceLocks>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            locks,
            events,
            clock,
            settings,
        }
    }

    /// Start a run if the device asked for one. Returns true when a run started.
    ///
    /// A run in progress with no whitelist command left in the queue lost its
    /// step to an earlier failure and is advanced here.
    pub async fn process_whitelist_sync(&self, guard: &DeviceGuard) -> Result<bool> {
        let device_id = guard.device_id();
        let Some(device) = self.store.get_device(device_id).await? else {
            tracing::warn!(device_id, "Device not found for whitelist sync");
            return Ok(false);
        };
        let state = &device.sync;

        if !state.enabled() {
            return Ok(false);
        }

        if state.has_timed_out(self.clock.now(), self.settings.timeout) {
            self.fail(&device, state.clone(), FailureReason::TimedOut)
                .await?;
            return Ok(false);
        }

        if state.is_in_progress() {
            let pending = self.store.pending_commands(device_id, None).await?;
            if !pending.iter().any(|c| c.is_whitelist_type()) {
                tracing::warn!(
                    device_id,
                    status = %state.status(),
                    batches_sent = state.batches_sent(),
                    "Whitelist sync has nothing queued, resuming"
                );
                self.process_next_sync_step(guard).await?;
                return Ok(false);
            }
            tracing::debug!(
                device_id,
                status = %state.status(),
                batches_sent = state.batches_sent(),
                total_batches = state.total_batches(),
                "Whitelist sync already in progress"
            );
            return Ok(false);
        }

        self.start(&device).await?;
        Ok(true)
    }

    /// Advance a run after this poll's whitelist commands were consumed.
    pub async fn process_next_sync_step(&self, guard: &DeviceGuard) -> Result<()> {
        let Some(device) = self.store.get_device(guard.device_id()).await? else {
            return Ok(());
        };
        let mut state = device.sync.clone();

        match state.status() {
            SyncStatus::Clearing => {
                tracing::info!(device_id = device.id, "Moving to adding phase");
                state.begin_adding();
                self.send_next_batch(&device, state).await
            }
            SyncStatus::Adding if state.all_batches_sent() => self.complete(&device, state).await,
            SyncStatus::Adding => self.send_next_batch(&device, state).await,
            SyncStatus::Idle | SyncStatus::Completed | SyncStatus::Failed => Ok(()),
        }
    }

    /// Operator request: reset the register so the next poll starts a fresh run.
    pub async fn trigger_sync(&self, device_id: i32) -> Result<SyncStatusView> {
        let _guard = self.locks.acquire(device_id).await;
        let device = self.require_device(device_id).await?;

        let mut state = device.sync.clone();
        state.reset();
        self.store.save_sync_state(device.id, &state).await?;

        tracing::info!(device_id, "Whitelist sync triggered");
        self.events
            .emit("sync.triggered", device.site_id, device.id, None);
        Ok(SyncStatusView::of(device.id, &state))
    }

    /// Operator request: abandon the current run. Queued commands stay queued.
    pub async fn cancel_sync(&self, device_id: i32) -> Result<SyncStatusView> {
        let _guard = self.locks.acquire(device_id).await;
        let device = self.require_device(device_id).await?;

        if !device.sync.enabled() {
            return Err(AppError::InvalidState(format!(
                "No active whitelist sync to cancel for device {}",
                device_id
            )));
        }

        let state = self
            .fail(&device, device.sync.clone(), FailureReason::Cancelled)
            .await?;
        Ok(SyncStatusView::of(device.id, &state))
    }

    pub async fn get_sync_status(&self, device_id: i32) -> Result<SyncStatusView> {
        let device = self.require_device(device_id).await?;
        Ok(SyncStatusView::of(device.id, &device.sync))
    }

    /// Trigger a sync on every device of a site. Returns how many were reset.
    pub async fn trigger_site_sync(&self, site_code: &str) -> Result<usize> {
        let site_id = self.require_site_id(site_code).await?;
        let devices = self.store.list_site_devices(site_id).await?;
        for device in &devices {
            self.trigger_sync(device.id).await?;
        }
        tracing::info!(site_code, devices = devices.len(), "Whitelist sync triggered for site");
        Ok(devices.len())
    }

    pub async fn list_site_sync_status(&self, site_code: &str) -> Result<Vec<DeviceSyncSummary>> {
        let site_id = self.require_site_id(site_code).await?;
        let devices = self.store.list_site_devices(site_id).await?;
        Ok(devices
            .into_iter()
            .map(|d| DeviceSyncSummary {
                sync: SyncStatusView::of(d.id, &d.sync),
                serial_number: d.serial_number,
                device_name: d.device_name,
                is_online: d.is_online,
            })
            .collect())
    }

    /// Resolve a device addressed through a site route.
    pub async fn require_site_device(&self, site_code: &str, device_id: i32) -> Result<Device> {
        let site_id = self.require_site_id(site_code).await?;
        self.store
            .get_device(device_id)
            .await?
            .filter(|d| d.site_id == site_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Device '{}' not found in site '{}'",
                    device_id, site_code
                ))
            })
    }

    async fn require_site_id(&self, site_code: &str) -> Result<i32> {
        self.store
            .find_site_by_code(site_code)
            .await?
            .map(|s| s.id)
            .ok_or_else(|| AppError::NotFound(format!("Site '{}' not found", site_code)))
    }

    async fn require_device(&self, device_id: i32) -> Result<Device> {
        self.store
            .get_device(device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device {} not found", device_id)))
    }

    fn queued(&self, device: &Device, command: DeviceCommand) -> NewCommand {
        NewCommand {
            site_id: device.site_id,
            device_id: device.id,
            command,
            priority: DEFAULT_PRIORITY,
            created_at: self.clock.now(),
        }
    }

    async fn start(&self, device: &Device) -> Result<()> {
        let eligible = self.store.count_sync_whitelist(device.site_id).await?;
        let total_batches = i32::try_from(div_ceil(eligible, self.settings.batch_size))
            .map_err(|_| AppError::Internal(format!("Whitelist too large: {} rows", eligible)))?;

        let mut state = device.sync.clone();
        state.start(total_batches, self.clock.now());
        self.store
            .commit_sync_step(
                device.id,
                &state,
                Some(self.queued(device, DeviceCommand::WhitelistClear)),
            )
            .await?;

        metrics_service::record_sync_started(total_batches);
        metrics_service::record_command_enqueued("whitelist_clear");
        tracing::info!(
            device_id = device.id,
            eligible,
            total_batches,
            "Whitelist sync started"
        );
        self.events.emit(
            "sync.started",
            device.site_id,
            device.id,
            Some(format!("{} batches", total_batches)),
        );
        Ok(())
    }

    /// Queue the page at `batches_sent`, or complete when the page is empty.
    async fn send_next_batch(&self, device: &Device, mut state: DeviceSyncState) -> Result<()> {
        let limit = self.settings.batch_size;
        let offset = i64::from(state.batches_sent()) * limit;
        let page = self
            .store
            .sync_whitelist_page(device.site_id, offset, limit)
            .await?;

        if page.is_empty() {
            tracing::info!(device_id = device.id, offset, "No whitelist rows left, completing");
            return self.complete(device, state).await;
        }

        let whitelist_data = page.iter().map(WhitelistPlate::from_entry).collect();
        state.record_batch_sent();
        self.store
            .commit_sync_step(
                device.id,
                &state,
                Some(self.queued(device, DeviceCommand::WhitelistAddBatch { whitelist_data })),
            )
            .await?;

        metrics_service::record_command_enqueued("whitelist_add_batch");
        tracing::info!(
            device_id = device.id,
            batch = state.batches_sent(),
            total_batches = state.total_batches(),
            entries = page.len(),
            "Queued whitelist batch"
        );
        self.events.emit(
            "sync.batch_queued",
            device.site_id,
            device.id,
            Some(format!("{}/{}", state.batches_sent(), state.total_batches())),
        );
        Ok(())
    }

    async fn complete(&self, device: &Device, mut state: DeviceSyncState) -> Result<()> {
        state.complete();
        self.store.save_sync_state(device.id, &state).await?;

        metrics_service::record_sync_completed();
        tracing::info!(device_id = device.id, "Whitelist sync completed");
        self.events
            .emit("sync.completed", device.site_id, device.id, None);
        Ok(())
    }

    async fn fail(
        &self,
        device: &Device,
        mut state: DeviceSyncState,
        reason: FailureReason,
    ) -> Result<DeviceSyncState> {
        state.fail();
        self.store.save_sync_state(device.id, &state).await?;

        metrics_service::record_sync_failed(reason.metric_label());
        tracing::warn!(
            device_id = device.id,
            reason = reason.message(),
            batches_sent = state.batches_sent(),
            total_batches = state.total_batches(),
            "Whitelist sync failed"
        );
        self.events.emit(
            "sync.failed",
            device.site_id,
            device.id,
            Some(reason.message().to_string()),
        );
        Ok(state)
    }
}

fn div_ceil(count: i64, size: i64) -> i64 {
    if count <= 0 {
        0
    } else {
        (count + size - 1) / size
    }
}

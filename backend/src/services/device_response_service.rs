//! Translates queued commands into the camera's response envelope.

use std::sync::Arc;

use crate::error::Result;
use crate::models::command::{CommandEntry, DeviceCommand, OperateType, WhitelistPlate};
use crate::protocol::response::{ResponseAlarmInfoPlate, TriggerImage, WhiteListOperate, INFO_OK};
use crate::services::command_queue_service::CommandQueueService;
use crate::services::device_lock::DeviceGuard;
use crate::services::event_bus::EventBus;
use crate::services::metrics_service;
use crate::services::whitelist_sync_service::WhitelistSyncService;

/// Whitelist commands selected for one response.
#[derive(Debug, Default, PartialEq)]
pub struct WhitelistPlan {
    pub operate: Option<OperateType>,
    pub entries: Vec<WhitelistPlate>,
    /// Commands whose entries are in `entries`
    pub consumed: Vec<i64>,
    /// Undecodable whitelist commands passed over while selecting
    pub dropped: Vec<i64>,
}

impl WhitelistPlan {
    pub fn block(&self) -> Option<WhiteListOperate> {
        self.operate
            .map(|op| WhiteListOperate::new(op, self.entries.clone()))
    }
}

/// Select the whitelist commands to deliver in one response.
///
/// Takes the longest queue-order run of whitelist commands that share one
/// operate type and whose entries fit in `limit`. The first command is always
/// taken so an oversized one cannot block the queue.
pub fn plan_whitelist_block(pending: &[CommandEntry], limit: usize) -> WhitelistPlan {
    let mut plan = WhitelistPlan::default();

    for entry in pending.iter().filter(|c| c.is_whitelist_type()) {
        let command = match entry.decode() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    command_id = entry.id,
                    error = %e,
                    "Dropping undecodable whitelist command"
                );
                plan.dropped.push(entry.id);
                continue;
            }
        };
        let Some(operate) = command.operate_type() else {
            plan.dropped.push(entry.id);
            continue;
        };

        let entries = command.whitelist_entries();
        match plan.operate {
            None => plan.operate = Some(operate),
            Some(current) if current != operate => break,
            Some(_) if plan.entries.len() + entries.len() > limit => break,
            Some(_) => {}
        }
        plan.entries.extend(entries);
        plan.consumed.push(entry.id);
    }

    plan
}

/// Apply every non-whitelist command to the envelope. Returns the ids handled
/// and the ids dropped.
fn apply_device_commands(
    pending: &[CommandEntry],
    response: &mut ResponseAlarmInfoPlate,
) -> (Vec<(i64, String)>, Vec<(i64, String)>) {
    let mut delivered = Vec::new();
    let mut dropped = Vec::new();

    for entry in pending.iter().filter(|c| !c.is_whitelist_type()) {
        match entry.decode() {
            Ok(DeviceCommand::GateOpen) => response.info = INFO_OK.to_string(),
            Ok(DeviceCommand::ManualTrigger) => response.manual_trigger = Some(INFO_OK.to_string()),
            Ok(DeviceCommand::Screenshot { port, url }) => {
                response.trigger_image = Some(TriggerImage {
                    port,
                    snap_image_absolutely_url: url,
                })
            }
            Ok(DeviceCommand::ManualCommand { serial_data }) => response
                .serial_data
                .get_or_insert_with(Vec::new)
                .extend(serial_data),
            Ok(other) => {
                tracing::warn!(
                    command_id = entry.id,
                    command_type = other.command_type(),
                    "Whitelist command outside whitelist prefix"
                );
                dropped.push((entry.id, entry.command_type.clone()));
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    command_id = entry.id,
                    command_type = %entry.command_type,
                    error = %e,
                    "Dropping unrecognized command"
                );
                dropped.push((entry.id, entry.command_type.clone()));
                continue;
            }
        }
        delivered.push((entry.id, entry.command_type.clone()));
    }

    (delivered, dropped)
}

pub struct DeviceResponseService {
    commands: Arc<CommandQueueService>,
    sync: Arc<WhitelistSyncService>,
    events: Arc<EventBus>,
    operate_limit: usize,
}

impl DeviceResponseService {
    pub fn new(
        commands: Arc<CommandQueueService>,
        sync: Arc<WhitelistSyncService>,
        events: Arc<EventBus>,
        operate_limit: usize,
    ) -> Self {
        Self {
            commands,
            sync,
            events,
            operate_limit,
        }
    }

    /// Drain the device's queue into `response`.
    ///
    /// Consumed and dropped commands are marked processed. When whitelist
    /// commands went out, the sync machine is advanced afterwards.
    pub async fn build_device_response(
        &self,
        guard: &DeviceGuard,
        site_id: i32,
        mut response: ResponseAlarmInfoPlate,
    ) -> Result<ResponseAlarmInfoPlate> {
        let device_id = guard.device_id();
        let pending = self.commands.drain_pending(device_id, None).await?;
        if pending.is_empty() {
            return Ok(response);
        }

        let plan = plan_whitelist_block(&pending, self.operate_limit);
        response.white_list_operate = plan.block();

        let (delivered, mut dropped) = apply_device_commands(&pending, &mut response);
        dropped.extend(
            pending
                .iter()
                .filter(|c| plan.dropped.contains(&c.id))
                .map(|c| (c.id, c.command_type.clone())),
        );

        let mut processed: Vec<i64> = plan.consumed.clone();
        processed.extend(delivered.iter().map(|(id, _)| *id));
        processed.extend(dropped.iter().map(|(id, _)| *id));
        self.commands.mark_consumed(&processed).await?;

        for entry in pending.iter().filter(|c| plan.consumed.contains(&c.id)) {
            metrics_service::record_command_delivered(&entry.command_type);
        }
        for (_, command_type) in &delivered {
            metrics_service::record_command_delivered(command_type);
        }
        for (id, command_type) in &dropped {
            metrics_service::record_command_dropped(command_type);
            self.events.emit(
                "command.dropped",
                site_id,
                device_id,
                Some(format!("{} ({})", command_type, id)),
            );
        }

        tracing::debug!(
            device_id,
            whitelist_entries = plan.entries.len(),
            whitelist_commands = plan.consumed.len(),
            other_commands = delivered.len(),
            dropped = dropped.len(),
            "Built device response"
        );

        if !plan.consumed.is_empty() {
            // The block is already marked processed, so it must go out regardless.
            if let Err(e) = self.sync.process_next_sync_step(guard).await {
                tracing::warn!(device_id, error = %e, "Failed to advance whitelist sync");
            }
        }

        Ok(response)
    }
}

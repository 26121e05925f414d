//! Postgres store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{DeviceSighting, LprStore};
use crate::error::{AppError, Result};
use crate::models::audit::{
    NewEntryLog, NewHeartbeat, NewIoTriggerEvent, NewPlateRecognition, NewResponseLog,
    NewSerialDataLog,
};
use crate::models::command::{CommandEntry, NewCommand};
use crate::models::device::{Device, DeviceRow, DeviceSyncState};
use crate::models::site::Site;
use crate::models::whitelist::WhitelistEntry;

const DEVICE_COLUMNS: &str = "id, site_id, serial_number, device_name, ip_address, is_online, \
     last_heartbeat, whitelist_start_sync, whitelist_sync_status, whitelist_sync_started_at, \
     whitelist_sync_batches_sent, whitelist_sync_total_batches, created_at, updated_at";

const WHITELIST_COLUMNS: &str = "id, site_id, device_id, license_plate, entry_type, is_enabled, \
     is_blacklist, enable_time, expiry_time, current_entries";

const COMMAND_COLUMNS: &str = "id, site_id, device_id, command_type, command_data, priority, \
     is_processed, created_at, processed_at";

/// [`LprStore`] backed by a sqlx connection pool.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    async fn insert_command_tx(
        tx: &mut Transaction<'_, Postgres>,
        command: &NewCommand,
    ) -> Result<CommandEntry> {
        let entry: CommandEntry = sqlx::query_as(&format!(
            r#"
            INSERT INTO command_queue (site_id, device_id, command_type, command_data, priority, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(command.site_id)
        .bind(command.device_id)
        .bind(command.command.command_type())
        .bind(command.command.payload())
        .bind(command.priority)
        .bind(command.created_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(entry)
    }
}

#[async_trait]
impl LprStore for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn find_site_by_code(&self, site_code: &str) -> Result<Option<Site>> {
        let site: Option<Site> = sqlx::query_as(
            r#"
            SELECT id, site_code, site_name, is_active, created_at, updated_at
            FROM sites
            WHERE site_code = $1
            "#,
        )
        .bind(site_code)
        .fetch_optional(&self.db)
        .await?;
        Ok(site)
    }

    async fn get_device(&self, device_id: i32) -> Result<Option<Device>> {
        let row: Option<DeviceRow> =
            sqlx::query_as(&format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"))
                .bind(device_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(Device::from))
    }

    async fn find_device_by_serial(
        &self,
        site_id: i32,
        serial_number: &str,
    ) -> Result<Option<Device>> {
        let row: Option<DeviceRow> = sqlx::query_as(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE site_id = $1 AND serial_number = $2"
        ))
        .bind(site_id)
        .bind(serial_number)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Device::from))
    }

    async fn upsert_device_seen(
        &self,
        site_id: i32,
        sighting: DeviceSighting<'_>,
        at: DateTime<Utc>,
    ) -> Result<Device> {
        let row: DeviceRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO devices (site_id, serial_number, device_name, ip_address, is_online,
                                 last_heartbeat, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5, $5)
            ON CONFLICT (site_id, serial_number) DO UPDATE
            SET is_online = TRUE,
                last_heartbeat = EXCLUDED.last_heartbeat,
                ip_address = COALESCE(EXCLUDED.ip_address, devices.ip_address),
                device_name = COALESCE(devices.device_name, EXCLUDED.device_name),
                updated_at = EXCLUDED.updated_at
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(site_id)
        .bind(sighting.serial_number)
        .bind(sighting.device_name)
        .bind(sighting.ip_address)
        .bind(at)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn mark_device_seen(
        &self,
        device_id: i32,
        ip_address: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET is_online = TRUE,
                last_heartbeat = $2,
                ip_address = COALESCE($3, ip_address),
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(device_id)
        .bind(at)
        .bind(ip_address)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_site_devices(&self, site_id: i32) -> Result<Vec<Device>> {
        let rows: Vec<DeviceRow> = sqlx::query_as(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE site_id = $1 ORDER BY id"
        ))
        .bind(site_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn commit_sync_step(
        &self,
        device_id: i32,
        state: &DeviceSyncState,
        command: Option<NewCommand>,
    ) -> Result<Option<CommandEntry>> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE devices
            SET whitelist_start_sync = $2,
                whitelist_sync_status = $3,
                whitelist_sync_started_at = $4,
                whitelist_sync_batches_sent = $5,
                whitelist_sync_total_batches = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(device_id)
        .bind(state.enabled())
        .bind(state.status().to_db())
        .bind(state.started_at())
        .bind(state.batches_sent())
        .bind(state.total_batches())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Device {} not found", device_id)));
        }

        let entry = match command {
            Some(command) => Some(Self::insert_command_tx(&mut tx, &command).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(entry)
    }

    async fn count_sync_whitelist(&self, site_id: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM whitelists WHERE site_id = $1 AND is_enabled AND NOT is_blacklist",
        )
        .bind(site_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    async fn sync_whitelist_page(
        &self,
        site_id: i32,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<WhitelistEntry>> {
        let rows: Vec<WhitelistEntry> = sqlx::query_as(&format!(
            r#"
            SELECT {WHITELIST_COLUMNS}
            FROM whitelists
            WHERE site_id = $1 AND is_enabled AND NOT is_blacklist
            ORDER BY id
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(site_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_active_whitelist_by_plate(
        &self,
        site_id: i32,
        normalized_plate: &str,
    ) -> Result<Option<WhitelistEntry>> {
        let row: Option<WhitelistEntry> = sqlx::query_as(&format!(
            r#"
            SELECT {WHITELIST_COLUMNS}
            FROM whitelists
            WHERE site_id = $1
              AND is_enabled
              AND UPPER(REGEXP_REPLACE(license_plate, '\s', '', 'g')) = $2
            ORDER BY id
            LIMIT 1
            "#
        ))
        .bind(site_id)
        .bind(normalized_plate)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn increment_whitelist_entries(&self, whitelist_id: i32) -> Result<()> {
        sqlx::query(
            "UPDATE whitelists SET current_entries = current_entries + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(whitelist_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn insert_command(&self, command: NewCommand) -> Result<CommandEntry> {
        let mut tx = self.db.begin().await?;
        let entry = Self::insert_command_tx(&mut tx, &command).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn pending_commands(
        &self,
        device_id: i32,
        limit: Option<i64>,
    ) -> Result<Vec<CommandEntry>> {
        let rows: Vec<CommandEntry> = sqlx::query_as(&format!(
            r#"
            SELECT {COMMAND_COLUMNS}
            FROM command_queue
            WHERE device_id = $1 AND NOT is_processed
            ORDER BY priority, created_at, id
            LIMIT $2
            "#
        ))
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn mark_processed(&self, command_ids: &[i64], at: DateTime<Utc>) -> Result<u64> {
        if command_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            UPDATE command_queue
            SET is_processed = TRUE, processed_at = $2
            WHERE id = ANY($1) AND NOT is_processed
            "#,
        )
        .bind(command_ids)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_heartbeat(&self, heartbeat: NewHeartbeat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_heartbeats (site_id, device_id, heartbeat_type, user_name, channel_num, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(heartbeat.site_id)
        .bind(heartbeat.device_id)
        .bind(heartbeat.kind.as_str())
        .bind(&heartbeat.user_name)
        .bind(heartbeat.channel_num)
        .bind(heartbeat.received_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_plate_recognition(&self, recognition: NewPlateRecognition) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO plate_recognition_results (site_id, device_id, plate_id, license_plate,
                confidence, direction, trigger_type, is_offline, recognition_timestamp, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(recognition.site_id)
        .bind(recognition.device_id)
        .bind(recognition.plate_id)
        .bind(&recognition.license_plate)
        .bind(recognition.confidence)
        .bind(recognition.direction)
        .bind(recognition.trigger_type)
        .bind(recognition.is_offline)
        .bind(recognition.recognition_timestamp)
        .bind(recognition.created_at)
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    async fn record_entry_log(&self, entry: NewEntryLog) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entry_logs (site_id, device_id, whitelist_id, plate_recognition_id,
                license_plate, entry_type, entry_status, gate_opened, entry_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(entry.site_id)
        .bind(entry.device_id)
        .bind(entry.whitelist_id)
        .bind(entry.plate_recognition_id)
        .bind(&entry.license_plate)
        .bind(&entry.entry_type)
        .bind(&entry.entry_status)
        .bind(entry.gate_opened)
        .bind(entry.entry_time)
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    async fn record_response_log(&self, log: NewResponseLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO response_logs (site_id, device_id, request_type, request_data,
                response_data, processing_time_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.site_id)
        .bind(log.device_id)
        .bind(&log.request_type)
        .bind(&log.request_data)
        .bind(&log.response_data)
        .bind(log.processing_time_ms)
        .bind(log.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_io_trigger(&self, event: NewIoTriggerEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO io_trigger_events (site_id, device_id, source, value, triggered_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.site_id)
        .bind(event.device_id)
        .bind(event.source)
        .bind(event.value)
        .bind(event.triggered_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_serial_data(&self, log: NewSerialDataLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO serial_data_logs (site_id, device_id, serial_channel, data_base64,
                data_length, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(log.site_id)
        .bind(log.device_id)
        .bind(log.serial_channel)
        .bind(&log.data_base64)
        .bind(log.data_length)
        .bind(log.received_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Requires a migrated database in `DATABASE_URL`.

    use super::*;
    use crate::models::command::DeviceCommand;
    use crate::models::device::SyncStatus;

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&url, 2).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        PgStore::new(pool)
    }

    async fn seed_device(store: &PgStore) -> Device {
        let code = format!("pg-{}", uuid::Uuid::new_v4());
        let site_id: i32 = sqlx::query_scalar(
            "INSERT INTO sites (site_code, site_name) VALUES ($1, $1) RETURNING id",
        )
        .bind(&code)
        .fetch_one(store.pool())
        .await
        .unwrap();
        store
            .upsert_device_seen(
                site_id,
                DeviceSighting {
                    serial_number: "sn-pg",
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_commit_sync_step_writes_state_and_command() {
        let store = store().await;
        let device = seed_device(&store).await;

        let mut state = device.sync.clone();
        state.reset();
        state.start(2, Utc::now());
        let entry = store
            .commit_sync_step(
                device.id,
                &state,
                Some(NewCommand {
                    site_id: device.site_id,
                    device_id: device.id,
                    command: DeviceCommand::WhitelistClear,
                    priority: 1,
                    created_at: Utc::now(),
                }),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.command_type, "whitelist_clear");

        let reloaded = store.get_device(device.id).await.unwrap().unwrap();
        assert_eq!(reloaded.sync.status(), SyncStatus::Clearing);
        assert_eq!(reloaded.sync.total_batches(), 2);
    }

    #[tokio::test]
    #[ignore]
    async fn test_mark_processed_is_one_shot() {
        let store = store().await;
        let device = seed_device(&store).await;
        let entry = store
            .insert_command(NewCommand {
                site_id: device.site_id,
                device_id: device.id,
                command: DeviceCommand::GateOpen,
                priority: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(store.mark_processed(&[entry.id], Utc::now()).await.unwrap(), 1);
        assert_eq!(store.mark_processed(&[entry.id], Utc::now()).await.unwrap(), 0);
        assert!(store.pending_commands(device.id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_plate_lookup_ignores_tabs_and_newlines() {
        let store = store().await;
        let device = seed_device(&store).await;
        sqlx::query("INSERT INTO whitelists (site_id, license_plate) VALUES ($1, $2)")
            .bind(device.site_id)
            .bind("b\t1234\nxyz")
            .execute(store.pool())
            .await
            .unwrap();

        let found = store
            .find_active_whitelist_by_plate(device.site_id, "B1234XYZ")
            .await
            .unwrap();
        assert_eq!(found.unwrap().license_plate, "b\t1234\nxyz");
    }
}

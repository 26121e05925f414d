//! Shared setup for the in-memory integration suites.
//!
//! Every test gets its own [`MemoryStore`] and a [`ManualClock`] parked at a
//! fixed instant, wired through the same `AppState` the server uses.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};

use lpr_gateway_backend::api::{routes::create_router, AppState, SharedState};
use lpr_gateway_backend::config::Config;
use lpr_gateway_backend::models::audit::HeartbeatKind;
use lpr_gateway_backend::models::device::Device;
use lpr_gateway_backend::models::site::Site;
use lpr_gateway_backend::models::whitelist::WhitelistEntry;
use lpr_gateway_backend::protocol::request::HeartbeatForm;
use lpr_gateway_backend::protocol::response::ResponseAlarmInfoPlate;
use lpr_gateway_backend::services::clock::ManualClock;
use lpr_gateway_backend::services::device_interaction_service::PollReply;
use lpr_gateway_backend::services::whitelist_sync_service::SyncStatusView;
use lpr_gateway_backend::storage::MemoryStore;

pub const SITE_CODE: &str = "HQ";
pub const SERIAL: &str = "e1b2c3d4-00112233";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("memory://".to_string()),
        _ => None,
    })
    .expect("default test config")
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub state: SharedState,
    pub site: Site,
    pub device: Device,
}

impl TestContext {
    /// One site with one registered device.
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let state = Arc::new(AppState::new(test_config(), store.clone(), clock.clone()));

        let site = store.insert_site(SITE_CODE, "Head office").await;
        let device = store.insert_device(site.id, SERIAL).await;

        Self {
            store,
            clock,
            state,
            site,
            device,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Seed `count` eligible rows plus one blacklisted and one disabled row.
    pub async fn seed_whitelist(&self, count: usize) {
        for i in 0..count {
            self.store
                .insert_whitelist(whitelist_row(self.site.id, &format!("B{:04}XYZ", i)))
                .await;
        }
        let mut blacklisted = whitelist_row(self.site.id, "BAD0001");
        blacklisted.is_blacklist = true;
        self.store.insert_whitelist(blacklisted).await;

        let mut disabled = whitelist_row(self.site.id, "OFF0001");
        disabled.is_enabled = false;
        self.store.insert_whitelist(disabled).await;
    }

    /// Simulate one comet poll from the device and return the envelope.
    pub async fn poll(&self) -> ResponseAlarmInfoPlate {
        let reply = self
            .state
            .interactions
            .handle_poll(SITE_CODE, HeartbeatKind::Comet, &poll_form(SERIAL))
            .await
            .expect("poll");
        match reply {
            PollReply::Envelope(envelope) => envelope.response_alarm_info_plate,
            PollReply::Ack(ack) => panic!("expected an envelope, got {:?}", ack),
        }
    }

    pub async fn sync_status(&self) -> SyncStatusView {
        self.state
            .sync
            .get_sync_status(self.device.id)
            .await
            .expect("sync status")
    }

    pub async fn pending_types(&self) -> Vec<String> {
        self.state
            .commands
            .drain_pending(self.device.id, None)
            .await
            .expect("pending commands")
            .into_iter()
            .map(|c| c.command_type)
            .collect()
    }
}

pub fn whitelist_row(site_id: i32, plate: &str) -> WhitelistEntry {
    WhitelistEntry {
        id: 0,
        site_id,
        device_id: None,
        license_plate: plate.to_string(),
        entry_type: "tenant".to_string(),
        is_enabled: true,
        is_blacklist: false,
        enable_time: None,
        expiry_time: None,
        current_entries: 0,
    }
}

pub fn poll_form(serial: &str) -> HeartbeatForm {
    HeartbeatForm {
        device_name: "gate-1".to_string(),
        ipaddr: "10.0.0.20".to_string(),
        serialno: serial.to_string(),
        channel_num: "0".to_string(),
        ..Default::default()
    }
}

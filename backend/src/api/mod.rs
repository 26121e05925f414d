//! API module - HTTP handlers and middleware.

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use crate::config::Config;
use crate::services::clock::Clock;
use crate::services::command_queue_service::CommandQueueService;
use crate::services::device_interaction_service::DeviceInteractionService;
use crate::services::device_lock::DeviceLocks;
use crate::services::device_response_service::DeviceResponseService;
use crate::services::entry_decision_service::EntryDecisionService;
use crate::services::event_bus::EventBus;
use crate::services::whitelist_sync_service::WhitelistSyncService;
use crate::storage::LprStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn LprStore>,
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<DeviceLocks>,
    pub event_bus: Arc<EventBus>,
    pub commands: Arc<CommandQueueService>,
    pub sync: Arc<WhitelistSyncService>,
    pub responses: Arc<DeviceResponseService>,
    pub interactions: Arc<DeviceInteractionService>,
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Wire the service graph over one store and clock.
    pub fn new(config: Config, store: Arc<dyn LprStore>, clock: Arc<dyn Clock>) -> Self {
        let settings = config.sync;
        let locks = Arc::new(DeviceLocks::default());
        let event_bus = Arc::new(EventBus::default());

        let commands = Arc::new(CommandQueueService::new(
            store.clone(),
            clock.clone(),
            settings,
        ));
        let sync = Arc::new(WhitelistSyncService::new(
            store.clone(),
            locks.clone(),
            event_bus.clone(),
            clock.clone(),
            settings,
        ));
        let responses = Arc::new(DeviceResponseService::new(
            commands.clone(),
            sync.clone(),
            event_bus.clone(),
            settings.operate_limit,
        ));
        let entries = Arc::new(EntryDecisionService::new(store.clone()));
        let interactions = Arc::new(DeviceInteractionService::new(
            store.clone(),
            locks.clone(),
            sync.clone(),
            responses.clone(),
            entries,
            clock.clone(),
        ));

        Self {
            config,
            store,
            clock,
            locks,
            event_bus,
            commands,
            sync,
            responses,
            interactions,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle for rendering /metrics output.
    pub fn set_metrics_handle(&mut self, handle: PrometheusHandle) {
        self.metrics_handle = Some(Arc::new(handle));
    }
}

pub type SharedState = Arc<AppState>;

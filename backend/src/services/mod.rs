//! Business logic services.

pub mod clock;
pub mod command_queue_service;
pub mod device_interaction_service;
pub mod device_lock;
pub mod device_response_service;
pub mod entry_decision_service;
pub mod event_bus;
pub mod metrics_service;
pub mod whitelist_sync_service;

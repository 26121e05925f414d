//! HTTP request handlers.

pub mod commands;
pub mod events;
pub mod health;
pub mod lpr_webhook;
pub mod whitelist_sync;

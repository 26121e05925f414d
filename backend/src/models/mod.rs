//! Database models (SQLx).

pub mod audit;
pub mod command;
pub mod device;
pub mod site;
pub mod whitelist;

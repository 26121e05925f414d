//! Site model: one tenant deployment (car park, residence) owning devices and whitelists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Site entity. Devices address their webhooks by `site_code`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Site {
    pub id: i32,
    pub site_code: String,
    pub site_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//! Gate decision for a recognized plate.

use std::sync::Arc;

use crate::error::Result;
use crate::models::whitelist::WhitelistEntry;
use crate::storage::LprStore;

pub use crate::models::whitelist::normalize_plate;

#[derive(Debug, Clone)]
pub struct EntryDecision {
    pub allowed: bool,
    pub matched: Option<WhitelistEntry>,
}

impl EntryDecision {
    pub fn entry_status(&self) -> &'static str {
        if self.allowed {
            "allowed"
        } else {
            "denied"
        }
    }

    pub fn entry_type(&self) -> String {
        self.matched
            .as_ref()
            .map(|w| w.entry_type.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

pub struct EntryDecisionService {
    store: Arc<dyn LprStore>,
}

impl EntryDecisionService {
    pub fn new(store: Arc<dyn LprStore>) -> Self {
        Self { store }
    }

    /// Match the plate against the site's enabled whitelist rows.
    /// A matching blacklist row denies entry.
    pub async fn decide(&self, site_id: i32, plate: &str) -> Result<EntryDecision> {
        let normalized = normalize_plate(plate);
        if normalized.is_empty() {
            return Ok(EntryDecision {
                allowed: false,
                matched: None,
            });
        }

        let matched = self
            .store
            .find_active_whitelist_by_plate(site_id, &normalized)
            .await?;
        let allowed = matched.as_ref().is_some_and(|w| !w.is_blacklist);

        tracing::info!(
            site_id,
            plate = %normalized,
            allowed,
            whitelist_id = matched.as_ref().map(|w| w.id),
            "Entry decision"
        );
        Ok(EntryDecision { allowed, matched })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn row(site_id: i32, plate: &str, blacklist: bool) -> WhitelistEntry {
        WhitelistEntry {
            id: 0,
            site_id,
            device_id: None,
            license_plate: plate.to_string(),
            entry_type: "tenant".to_string(),
            is_enabled: true,
            is_blacklist: blacklist,
            enable_time: None,
            expiry_time: None,
            current_entries: 0,
        }
    }

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate(" b 1234\txyz "), "B1234XYZ");
        assert_eq!(normalize_plate(""), "");
    }

    #[tokio::test]
    async fn test_decide_matches_ignoring_case_and_spaces() {
        let store = Arc::new(MemoryStore::new());
        let site = store.insert_site("HQ", "Head office").await;
        store.insert_whitelist(row(site.id, "B 1234 XYZ", false)).await;
        store.insert_whitelist(row(site.id, "BAD 1", true)).await;
        let service = EntryDecisionService::new(store.clone());

        let allowed = service.decide(site.id, "b1234xyz").await.unwrap();
        assert!(allowed.allowed);
        assert_eq!(allowed.entry_type(), "tenant");

        let blacklisted = service.decide(site.id, "BAD1").await.unwrap();
        assert!(!blacklisted.allowed);
        assert!(blacklisted.matched.is_some());

        let unknown = service.decide(site.id, "ZZZ").await.unwrap();
        assert!(!unknown.allowed);
        assert_eq!(unknown.entry_type(), "unknown");
        assert_eq!(unknown.entry_status(), "denied");
    }
}

//! Tier Catalog
//!
//! Read-only lookup over the per-country plan definitions. The engine never
//! mutates tiers; platform operators manage them out of band.

use std::collections::HashMap;

use dukani_shared::{TenantSubscription, Tier};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Grace window applied when a tenant references a tier the catalog no
/// longer knows about
pub const DEFAULT_GRACE_DAYS: i64 = 2;

#[derive(Debug, Clone, Default)]
pub struct TierCatalog {
    tiers: HashMap<Uuid, Tier>,
}

impl TierCatalog {
    pub fn from_tiers(tiers: Vec<Tier>) -> Self {
        Self {
            tiers: tiers.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn get(&self, tier_id: Uuid) -> BillingResult<&Tier> {
        self.tiers
            .get(&tier_id)
            .ok_or_else(|| BillingError::NotFound(format!("Tier {} not found", tier_id)))
    }

    /// Tiers a tenant in the given country may subscribe to
    pub fn active_for_country<'a>(&'a self, country: &'a str) -> impl Iterator<Item = &'a Tier> {
        self.tiers
            .values()
            .filter(move |t| t.active && t.country == country)
    }

    /// Grace window for a tenant, from its current tier. Falls back to the
    /// platform default when the tier reference is stale.
    pub fn grace_days_for(&self, tenant: &TenantSubscription) -> i64 {
        self.tiers
            .get(&tenant.tier_id)
            .map(|t| t.grace_days)
            .unwrap_or(DEFAULT_GRACE_DAYS)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn tier(country: &str, active: bool) -> Tier {
        Tier {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            country: country.to_string(),
            monthly_price_cents: 150_000,
            currency: "KES".to_string(),
            trial_days: 14,
            grace_days: 5,
            max_products: 50,
            max_monthly_orders: 500,
            max_storage_mb: 1024,
            active,
        }
    }

    #[test]
    fn country_filter_excludes_inactive_plans() {
        let catalog = TierCatalog::from_tiers(vec![tier("KE", true), tier("KE", false), tier("NG", true)]);
        assert_eq!(catalog.active_for_country("KE").count(), 1);
        assert_eq!(catalog.active_for_country("NG").count(), 1);
    }

    #[test]
    fn grace_days_fall_back_for_stale_tier_reference() {
        let known = tier("KE", true);
        let catalog = TierCatalog::from_tiers(vec![known.clone()]);
        let now = OffsetDateTime::now_utc();

        let tenant = TenantSubscription::new_trial(Uuid::new_v4(), &known, now);
        assert_eq!(catalog.grace_days_for(&tenant), 5);

        let orphan = tier("KE", true);
        let tenant = TenantSubscription::new_trial(Uuid::new_v4(), &orphan, now);
        assert_eq!(catalog.grace_days_for(&tenant), DEFAULT_GRACE_DAYS);
    }
}

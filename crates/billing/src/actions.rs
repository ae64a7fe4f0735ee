//! Self-Service Action Handler
//!
//! Tenant-owner-triggered transitions layered on the same state machine
//! the automation pass drives. Tier changes never take effect immediately:
//! they mint a pending invoice at the full new-tier price, and the switch
//! happens when the payment review workflow approves it.

use std::sync::Arc;

use dukani_shared::{Invoice, InvoiceType, SubscriptionStatus, TenantSubscription};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{BillingError, BillingResult};
use crate::lifecycle;
use crate::store::{BillingStore, NewInvoice};
use crate::tiers::TierCatalog;

pub struct TenantActionService<S> {
    store: Arc<S>,
    catalog: TierCatalog,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore> TenantActionService<S> {
    pub fn new(store: Arc<S>, catalog: TierCatalog, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            clock,
        }
    }

    /// Mint an upgrade/downgrade invoice for the requested tier. The
    /// tenant keeps its current tier and state until the invoice is
    /// approved. No proration: the full new-tier monthly price is billed.
    pub async fn request_tier_change(
        &self,
        tenant_id: Uuid,
        new_tier_id: Uuid,
    ) -> BillingResult<Invoice> {
        let tenant = self.store.tenant(tenant_id).await?;
        match tenant.status {
            SubscriptionStatus::Active | SubscriptionStatus::Overdue => {}
            other => {
                return Err(BillingError::InvalidState(format!(
                    "Tier changes are only available to active or overdue subscriptions (tenant is {})",
                    other
                )))
            }
        }

        let current_tier = self.catalog.get(tenant.tier_id)?;
        let new_tier = self.catalog.get(new_tier_id)?;
        if new_tier.id == current_tier.id {
            return Err(BillingError::ValidationError(
                "Already subscribed to this tier".to_string(),
            ));
        }
        if !new_tier.active {
            return Err(BillingError::ValidationError(format!(
                "Tier '{}' is no longer offered",
                new_tier.name
            )));
        }
        if new_tier.currency != current_tier.currency {
            return Err(BillingError::ValidationError(format!(
                "Cannot change from a {} tier to a {} tier",
                current_tier.currency, new_tier.currency
            )));
        }

        let invoice_type = if new_tier.monthly_price_cents > current_tier.monthly_price_cents {
            InvoiceType::Upgrade
        } else {
            InvoiceType::Downgrade
        };

        let now = self.clock.now();
        let invoice = self
            .store
            .create_invoice(NewInvoice {
                tenant_id,
                tier_id: new_tier.id,
                invoice_type,
                amount_cents: new_tier.monthly_price_cents,
                currency: new_tier.currency.clone(),
                due_date: now,
                period_start: now,
                period_end: now + lifecycle::billing_period(),
                issued_at: now,
            })
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            from_tier = %current_tier.name,
            to_tier = %new_tier.name,
            invoice = %invoice.number,
            invoice_type = %invoice.invoice_type,
            "Tier change invoice created"
        );
        Ok(invoice)
    }

    /// Pause an active storefront with paid time remaining.
    pub async fn pause(&self, tenant_id: Uuid) -> BillingResult<TenantSubscription> {
        let mut tenant = self.store.tenant(tenant_id).await?;
        lifecycle::pause(&mut tenant, self.clock.now())?;
        let tenant = self.store.update_tenant(&tenant).await?;
        tracing::info!(tenant_id = %tenant_id, "Subscription paused");
        Ok(tenant)
    }

    /// Resume a paused storefront. Fails with `ExpiredSubscription` when
    /// the paid period lapsed while paused.
    pub async fn resume(&self, tenant_id: Uuid) -> BillingResult<TenantSubscription> {
        let mut tenant = self.store.tenant(tenant_id).await?;
        lifecycle::resume(&mut tenant, self.clock.now())?;
        let tenant = self.store.update_tenant(&tenant).await?;
        tracing::info!(tenant_id = %tenant_id, "Subscription resumed");
        Ok(tenant)
    }

    /// Cancel permanently. The reason is stored for audit only.
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        reason: &str,
    ) -> BillingResult<TenantSubscription> {
        let mut tenant = self.store.tenant(tenant_id).await?;
        lifecycle::cancel(&mut tenant, reason, self.clock.now())?;
        let tenant = self.store.update_tenant(&tenant).await?;
        tracing::info!(tenant_id = %tenant_id, reason = %reason, "Subscription cancelled");
        Ok(tenant)
    }
}

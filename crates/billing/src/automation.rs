//! Automation Scheduler Loop
//!
//! The recurring batch pass that drives subscription lifecycles forward
//! without human input. An external scheduler (cron) triggers
//! [`AutomationService::run_pass`] on a fixed cadence; the pass itself is
//! idempotent and tolerates overlapping invocations - a duplicate invoice
//! insert from a concurrent runner counts as "already handled", and a
//! version conflict on a tenant record is skipped and reported.
//!
//! Cohorts, in order:
//! 1. trials ending inside the lookahead window get a trial-conversion
//!    invoice,
//! 2. active subscriptions ending inside the renewal window get a renewal
//!    invoice,
//! 3. lapsed trials and lapsed subscriptions go overdue,
//! 4. overdue tenants past their tier's grace window get suspended.

use std::sync::Arc;

use dukani_shared::{InvoiceType, SubscriptionStatus, TenantSubscription};
use serde::Serialize;
use time::Duration;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{BillingError, BillingResult};
use crate::lifecycle;
use crate::store::{BillingStore, NewInvoice};
use crate::tiers::TierCatalog;

pub const DEFAULT_TRIAL_LOOKAHEAD_DAYS: i64 = 3;
pub const DEFAULT_RENEWAL_LOOKAHEAD_DAYS: i64 = 5;

/// Lookahead windows for the invoice-minting cohorts
#[derive(Debug, Clone, Copy)]
pub struct AutomationConfig {
    pub trial_lookahead_days: i64,
    pub renewal_lookahead_days: i64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            trial_lookahead_days: DEFAULT_TRIAL_LOOKAHEAD_DAYS,
            renewal_lookahead_days: DEFAULT_RENEWAL_LOOKAHEAD_DAYS,
        }
    }
}

/// A per-tenant failure recorded during a pass. The pass never aborts on
/// one tenant's error.
#[derive(Debug, Clone, Serialize)]
pub struct TenantError {
    pub tenant_id: Uuid,
    pub message: String,
}

/// Structured result of one automation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub trial_invoices_created: usize,
    pub renewal_invoices_created: usize,
    pub marked_overdue: usize,
    pub suspended: usize,
    /// Tenants whose billing period was already covered by an open invoice
    /// (either from an earlier pass or a concurrent runner)
    pub skipped_existing: usize,
    pub errors: Vec<TenantError>,
}

pub struct AutomationService<S> {
    store: Arc<S>,
    catalog: TierCatalog,
    clock: Arc<dyn Clock>,
    config: AutomationConfig,
}

impl<S: BillingStore> AutomationService<S> {
    pub fn new(store: Arc<S>, catalog: TierCatalog, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, catalog, clock, AutomationConfig::default())
    }

    pub fn with_config(
        store: Arc<S>,
        catalog: TierCatalog,
        clock: Arc<dyn Clock>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            config,
        }
    }

    /// Run one full pass over all tenant cohorts.
    pub async fn run_pass(&self) -> BillingResult<PassSummary> {
        let mut summary = PassSummary::default();

        self.mint_trial_conversions(&mut summary).await?;
        self.mint_renewals(&mut summary).await?;
        self.sweep_expiries(&mut summary).await?;
        self.sweep_suspensions(&mut summary).await?;

        tracing::info!(
            trial_invoices = summary.trial_invoices_created,
            renewal_invoices = summary.renewal_invoices_created,
            marked_overdue = summary.marked_overdue,
            suspended = summary.suspended,
            skipped_existing = summary.skipped_existing,
            errors = summary.errors.len(),
            "Automation pass complete"
        );
        Ok(summary)
    }

    /// Cohort 1: trials ending within the lookahead window.
    async fn mint_trial_conversions(&self, summary: &mut PassSummary) -> BillingResult<()> {
        let now = self.clock.now();
        let horizon = now + Duration::days(self.config.trial_lookahead_days);

        for tenant in self.store.tenants_by_status(SubscriptionStatus::Trial).await? {
            if tenant.trial_ends_at > horizon {
                continue;
            }
            let period_start = tenant.trial_ends_at;
            match self
                .mint(&tenant, InvoiceType::TrialConversion, period_start)
                .await
            {
                Ok(invoice) => {
                    summary.trial_invoices_created += 1;
                    tracing::info!(
                        tenant_id = %tenant.tenant_id,
                        number = %invoice.number,
                        due_date = %invoice.due_date,
                        "Created trial conversion invoice"
                    );
                }
                Err(BillingError::DuplicateInvoice(_)) => summary.skipped_existing += 1,
                Err(e) => record_error(summary, tenant.tenant_id, e),
            }
        }
        Ok(())
    }

    /// Cohort 2: renewals ending within the lookahead window. Scoped by the
    /// billing-period start so an already-invoiced period is never billed
    /// twice.
    async fn mint_renewals(&self, summary: &mut PassSummary) -> BillingResult<()> {
        let now = self.clock.now();
        let horizon = now + Duration::days(self.config.renewal_lookahead_days);

        for tenant in self.store.tenants_by_status(SubscriptionStatus::Active).await? {
            let Some(ends_at) = tenant.subscription_ends_at else {
                continue;
            };
            if ends_at > horizon {
                continue;
            }
            match self.mint(&tenant, InvoiceType::Renewal, ends_at).await {
                Ok(invoice) => {
                    summary.renewal_invoices_created += 1;
                    tracing::info!(
                        tenant_id = %tenant.tenant_id,
                        number = %invoice.number,
                        due_date = %invoice.due_date,
                        "Created renewal invoice"
                    );
                }
                Err(BillingError::DuplicateInvoice(_)) => summary.skipped_existing += 1,
                Err(e) => record_error(summary, tenant.tenant_id, e),
            }
        }
        Ok(())
    }

    /// Cohort 3: lapsed trials and lapsed subscriptions become overdue.
    async fn sweep_expiries(&self, summary: &mut PassSummary) -> BillingResult<()> {
        let now = self.clock.now();

        let mut lapsed: Vec<TenantSubscription> = Vec::new();
        for tenant in self.store.tenants_by_status(SubscriptionStatus::Trial).await? {
            if tenant.trial_ends_at <= now {
                lapsed.push(tenant);
            }
        }
        for tenant in self.store.tenants_by_status(SubscriptionStatus::Active).await? {
            if tenant.subscription_ends_at.map(|e| e <= now).unwrap_or(false) {
                lapsed.push(tenant);
            }
        }

        for mut tenant in lapsed {
            let result = lifecycle::mark_overdue(&mut tenant, now);
            match result {
                Ok(()) => match self.store.update_tenant(&tenant).await {
                    Ok(_) => {
                        summary.marked_overdue += 1;
                        tracing::info!(tenant_id = %tenant.tenant_id, "Tenant marked overdue");
                    }
                    // Another runner already transitioned this tenant.
                    Err(BillingError::ConcurrentModification(_)) => {}
                    Err(e) => record_error(summary, tenant.tenant_id, e),
                },
                Err(e) => record_error(summary, tenant.tenant_id, e),
            }
        }
        Ok(())
    }

    /// Cohort 4: overdue tenants whose tier grace window has elapsed.
    async fn sweep_suspensions(&self, summary: &mut PassSummary) -> BillingResult<()> {
        let now = self.clock.now();

        for tenant in self.store.tenants_by_status(SubscriptionStatus::Overdue).await? {
            let grace_days = self.catalog.grace_days_for(&tenant);
            let elapsed = tenant
                .overdue_since
                .map(|since| since + Duration::days(grace_days) <= now)
                .unwrap_or(false);
            if !elapsed {
                continue;
            }

            let mut tenant = tenant;
            match lifecycle::suspend(&mut tenant, grace_days, now) {
                Ok(()) => match self.store.update_tenant(&tenant).await {
                    Ok(_) => {
                        summary.suspended += 1;
                        tracing::info!(
                            tenant_id = %tenant.tenant_id,
                            grace_days = grace_days,
                            "Tenant suspended after grace period"
                        );
                    }
                    Err(BillingError::ConcurrentModification(_)) => {}
                    Err(e) => record_error(summary, tenant.tenant_id, e),
                },
                Err(e) => record_error(summary, tenant.tenant_id, e),
            }
        }
        Ok(())
    }

    async fn mint(
        &self,
        tenant: &TenantSubscription,
        invoice_type: InvoiceType,
        period_start: time::OffsetDateTime,
    ) -> BillingResult<dukani_shared::Invoice> {
        let tier = self.catalog.get(tenant.tier_id)?;
        self.store
            .create_invoice(NewInvoice {
                tenant_id: tenant.tenant_id,
                tier_id: tier.id,
                invoice_type,
                amount_cents: tier.monthly_price_cents,
                currency: tier.currency.clone(),
                due_date: period_start,
                period_start,
                period_end: period_start + lifecycle::billing_period(),
                issued_at: self.clock.now(),
            })
            .await
    }
}

fn record_error(summary: &mut PassSummary, tenant_id: Uuid, err: BillingError) {
    tracing::error!(tenant_id = %tenant_id, error = %err, "Automation pass tenant failure");
    summary.errors.push(TenantError {
        tenant_id,
        message: err.to_string(),
    });
}

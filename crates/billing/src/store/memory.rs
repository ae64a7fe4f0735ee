//! In-memory billing store
//!
//! Backs tests and local development. One async mutex over the whole state
//! gives every trait method the same atomicity the Postgres store gets
//! from transactions and its uniqueness constraint.

use std::collections::HashMap;

use async_trait::async_trait;
use dukani_shared::{Invoice, InvoiceStatus, SubscriptionStatus, TenantSubscription};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

use super::{invoice_number, month_key, BillingStore, NewInvoice};

#[derive(Default)]
struct Inner {
    tenants: HashMap<Uuid, TenantSubscription>,
    invoices: HashMap<Uuid, Invoice>,
    /// Next sequence value per `YYYYMM`
    sequences: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn tenant(&self, tenant_id: Uuid) -> BillingResult<TenantSubscription> {
        let inner = self.inner.lock().await;
        inner
            .tenants
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("Tenant {} not found", tenant_id)))
    }

    async fn insert_tenant(&self, tenant: &TenantSubscription) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.tenants.contains_key(&tenant.tenant_id) {
            return Err(BillingError::ValidationError(format!(
                "Tenant {} already has a subscription record",
                tenant.tenant_id
            )));
        }
        inner.tenants.insert(tenant.tenant_id, tenant.clone());
        Ok(())
    }

    async fn tenants_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> BillingResult<Vec<TenantSubscription>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tenants
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn update_tenant(
        &self,
        tenant: &TenantSubscription,
    ) -> BillingResult<TenantSubscription> {
        let mut inner = self.inner.lock().await;
        let stored = inner.tenants.get(&tenant.tenant_id).ok_or_else(|| {
            BillingError::NotFound(format!("Tenant {} not found", tenant.tenant_id))
        })?;
        if stored.version != tenant.version {
            return Err(BillingError::ConcurrentModification(format!(
                "Tenant {} was modified by another process",
                tenant.tenant_id
            )));
        }
        let mut updated = tenant.clone();
        updated.version += 1;
        inner.tenants.insert(updated.tenant_id, updated.clone());
        Ok(updated)
    }

    async fn invoice(&self, invoice_id: Uuid) -> BillingResult<Invoice> {
        let inner = self.inner.lock().await;
        inner
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("Invoice {} not found", invoice_id)))
    }

    async fn create_invoice(&self, new_invoice: NewInvoice) -> BillingResult<Invoice> {
        let mut inner = self.inner.lock().await;

        // Same predicate as the partial unique index in Postgres: rejected
        // invoices release the slot, everything else holds it.
        let duplicate = inner.invoices.values().any(|i| {
            i.tenant_id == new_invoice.tenant_id
                && i.invoice_type == new_invoice.invoice_type
                && i.period_start == new_invoice.period_start
                && i.status != InvoiceStatus::Rejected
        });
        if duplicate {
            return Err(BillingError::DuplicateInvoice(format!(
                "{} invoice for tenant {} period {} already exists",
                new_invoice.invoice_type, new_invoice.tenant_id, new_invoice.period_start
            )));
        }

        let key = month_key(new_invoice.issued_at);
        let seq = inner.sequences.entry(key.clone()).or_insert(0);
        *seq += 1;
        let number = invoice_number(&key, *seq);

        let invoice = Invoice {
            id: Uuid::new_v4(),
            tenant_id: new_invoice.tenant_id,
            tier_id: new_invoice.tier_id,
            number,
            invoice_type: new_invoice.invoice_type,
            status: InvoiceStatus::Pending,
            amount_cents: new_invoice.amount_cents,
            currency: new_invoice.currency,
            due_date: new_invoice.due_date,
            period_start: new_invoice.period_start,
            period_end: new_invoice.period_end,
            receipt_ref: None,
            reviewer_notes: None,
            submitted_at: None,
            reviewed_at: None,
            created_at: new_invoice.issued_at,
        };
        inner.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
    ) -> BillingResult<Invoice> {
        let mut inner = self.inner.lock().await;
        let stored = inner.invoices.get(&invoice.id).ok_or_else(|| {
            BillingError::NotFound(format!("Invoice {} not found", invoice.id))
        })?;
        if stored.status != expected {
            return Err(BillingError::InvalidState(format!(
                "Invoice {} is {}, expected {}",
                invoice.number, stored.status, expected
            )));
        }
        inner.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn commit_approval(
        &self,
        invoice: &Invoice,
        tenant: &TenantSubscription,
    ) -> BillingResult<()> {
        let mut inner = self.inner.lock().await;

        let stored_invoice = inner.invoices.get(&invoice.id).ok_or_else(|| {
            BillingError::NotFound(format!("Invoice {} not found", invoice.id))
        })?;
        if stored_invoice.status != InvoiceStatus::Submitted {
            return Err(BillingError::InvalidState(format!(
                "Invoice {} is {}, expected submitted",
                invoice.number, stored_invoice.status
            )));
        }
        let stored_tenant = inner.tenants.get(&tenant.tenant_id).ok_or_else(|| {
            BillingError::NotFound(format!("Tenant {} not found", tenant.tenant_id))
        })?;
        if stored_tenant.version != tenant.version {
            return Err(BillingError::ConcurrentModification(format!(
                "Tenant {} was modified by another process",
                tenant.tenant_id
            )));
        }

        // Both checks passed under the lock; apply both writes.
        inner.invoices.insert(invoice.id, invoice.clone());
        let mut updated = tenant.clone();
        updated.version += 1;
        inner.tenants.insert(updated.tenant_id, updated);
        Ok(())
    }

    async fn all_tenants(&self) -> BillingResult<Vec<TenantSubscription>> {
        let inner = self.inner.lock().await;
        Ok(inner.tenants.values().cloned().collect())
    }

    async fn all_invoices(&self) -> BillingResult<Vec<Invoice>> {
        let inner = self.inner.lock().await;
        Ok(inner.invoices.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dukani_shared::InvoiceType;
    use time::{Duration, OffsetDateTime};

    fn new_invoice(tenant_id: Uuid, period_start: OffsetDateTime) -> NewInvoice {
        NewInvoice {
            tenant_id,
            tier_id: Uuid::new_v4(),
            invoice_type: InvoiceType::TrialConversion,
            amount_cents: 150_000,
            currency: "KES".to_string(),
            due_date: period_start,
            period_start,
            period_end: period_start + Duration::days(30),
            issued_at: period_start - Duration::days(3),
        }
    }

    #[tokio::test]
    async fn duplicate_open_invoice_is_rejected() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let start = OffsetDateTime::now_utc();

        store.create_invoice(new_invoice(tenant_id, start)).await.unwrap();
        let err = store
            .create_invoice(new_invoice(tenant_id, start))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::DuplicateInvoice(_)));
    }

    #[tokio::test]
    async fn rejected_invoice_releases_the_period_slot() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let start = OffsetDateTime::now_utc();

        let mut first = store.create_invoice(new_invoice(tenant_id, start)).await.unwrap();
        first.status = InvoiceStatus::Submitted;
        store.update_invoice(&first, InvoiceStatus::Pending).await.unwrap();
        first.status = InvoiceStatus::Rejected;
        store.update_invoice(&first, InvoiceStatus::Submitted).await.unwrap();

        assert!(store.create_invoice(new_invoice(tenant_id, start)).await.is_ok());
    }

    #[tokio::test]
    async fn stale_tenant_version_is_rejected() {
        let store = MemoryStore::new();
        let tier = dukani_shared::Tier {
            id: Uuid::new_v4(),
            name: "Starter".to_string(),
            country: "KE".to_string(),
            monthly_price_cents: 150_000,
            currency: "KES".to_string(),
            trial_days: 14,
            grace_days: 2,
            max_products: 50,
            max_monthly_orders: 500,
            max_storage_mb: 1024,
            active: true,
        };
        let tenant =
            TenantSubscription::new_trial(Uuid::new_v4(), &tier, OffsetDateTime::now_utc());
        store.insert_tenant(&tenant).await.unwrap();

        // First writer wins, second writer carries the stale version
        store.update_tenant(&tenant).await.unwrap();
        let err = store.update_tenant(&tenant).await.unwrap_err();
        assert!(matches!(err, BillingError::ConcurrentModification(_)));
    }
}

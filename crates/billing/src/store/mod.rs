//! Billing persistence
//!
//! [`BillingStore`] is the seam between the engine and storage. Every
//! method is a single bounded, atomic operation: conditional invoice
//! insert, version-guarded tenant update, and the two-record approval
//! commit. The engine holds no locks of its own - per-tenant serialization
//! comes from these contracts, so overlapping automation runs stay safe.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use dukani_shared::{Invoice, InvoiceType, SubscriptionStatus, TenantSubscription};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Fields the engine supplies when minting an invoice. The store assigns
/// the id and the sequential number.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub tenant_id: Uuid,
    pub tier_id: Uuid,
    pub invoice_type: InvoiceType,
    pub amount_cents: i64,
    pub currency: String,
    pub due_date: OffsetDateTime,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub issued_at: OffsetDateTime,
}

#[async_trait]
pub trait BillingStore: Send + Sync + 'static {
    async fn tenant(&self, tenant_id: Uuid) -> BillingResult<TenantSubscription>;

    async fn insert_tenant(&self, tenant: &TenantSubscription) -> BillingResult<()>;

    async fn tenants_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> BillingResult<Vec<TenantSubscription>>;

    /// Persist a mutated tenant record. The record's `version` must match
    /// the stored one; on success the stored version is bumped and the
    /// fresh record returned. A stale version fails with
    /// `ConcurrentModification`.
    async fn update_tenant(
        &self,
        tenant: &TenantSubscription,
    ) -> BillingResult<TenantSubscription>;

    async fn invoice(&self, invoice_id: Uuid) -> BillingResult<Invoice>;

    /// Atomic conditional insert: allocates the next `INV-YYYYMM-NNNNNN`
    /// number and inserts, failing with `DuplicateInvoice` when an open or
    /// approved invoice already covers `(tenant, type, period_start)`.
    async fn create_invoice(&self, new_invoice: NewInvoice) -> BillingResult<Invoice>;

    /// Persist a mutated invoice, guarded by its expected current status.
    /// A concurrent reviewer winning the race surfaces as `InvalidState`.
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected: dukani_shared::InvoiceStatus,
    ) -> BillingResult<Invoice>;

    /// The approval transaction: persist the approved invoice and the
    /// activated tenant together, or neither. Guards the invoice's
    /// `Submitted` status and the tenant's version.
    async fn commit_approval(
        &self,
        invoice: &Invoice,
        tenant: &TenantSubscription,
    ) -> BillingResult<()>;

    // Full scans, used by the invariant checker only
    async fn all_tenants(&self) -> BillingResult<Vec<TenantSubscription>>;
    async fn all_invoices(&self) -> BillingResult<Vec<Invoice>>;
}

/// `YYYYMM` sequence key for an issue timestamp
pub(crate) fn month_key(at: OffsetDateTime) -> String {
    format!("{:04}{:02}", at.year(), u8::from(at.month()))
}

pub(crate) fn invoice_number(month_key: &str, seq: i64) -> String {
    format!("INV-{}-{:06}", month_key, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn number_format_is_stable() {
        let key = month_key(datetime!(2026-08-29 10:00 UTC));
        assert_eq!(key, "202608");
        assert_eq!(invoice_number(&key, 7), "INV-202608-000007");
    }
}

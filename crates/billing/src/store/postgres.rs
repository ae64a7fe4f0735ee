//! Postgres billing store
//!
//! The production store. Atomicity contracts map onto:
//! - a partial unique index on `(tenant_id, invoice_type, period_start)`
//!   over non-rejected invoices (duplicate inserts fail with 23505, which
//!   the error layer turns into `DuplicateInvoice`),
//! - version-guarded `UPDATE ... WHERE version = $n` for tenant records,
//! - one transaction spanning the invoice and tenant writes on approval,
//! - an upsert-returning sequence table keyed by `YYYYMM` for numbering.

use async_trait::async_trait;
use dukani_shared::{
    Invoice, InvoiceStatus, InvoiceType, SubscriptionStatus, TenantSubscription, Tier,
};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

use super::{invoice_number, month_key, BillingStore, NewInvoice};

const TENANT_COLUMNS: &str = "tenant_id, tier_id, status, trial_ends_at, \
     subscription_starts_at, subscription_ends_at, overdue_since, \
     is_payment_overdue, cancel_reason, version, updated_at";

const INVOICE_COLUMNS: &str = "id, tenant_id, tier_id, number, invoice_type, status, \
     amount_cents, currency, due_date, period_start, period_end, \
     receipt_ref, reviewer_notes, submitted_at, reviewed_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    tenant_id: Uuid,
    tier_id: Uuid,
    status: String,
    trial_ends_at: OffsetDateTime,
    subscription_starts_at: Option<OffsetDateTime>,
    subscription_ends_at: Option<OffsetDateTime>,
    overdue_since: Option<OffsetDateTime>,
    is_payment_overdue: bool,
    cancel_reason: Option<String>,
    version: i64,
    updated_at: OffsetDateTime,
}

impl TryFrom<TenantRow> for TenantSubscription {
    type Error = BillingError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(TenantSubscription {
            tenant_id: row.tenant_id,
            tier_id: row.tier_id,
            status: row.status.parse::<SubscriptionStatus>()?,
            trial_ends_at: row.trial_ends_at,
            subscription_starts_at: row.subscription_starts_at,
            subscription_ends_at: row.subscription_ends_at,
            overdue_since: row.overdue_since,
            is_payment_overdue: row.is_payment_overdue,
            cancel_reason: row.cancel_reason,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    tenant_id: Uuid,
    tier_id: Uuid,
    number: String,
    invoice_type: String,
    status: String,
    amount_cents: i64,
    currency: String,
    due_date: OffsetDateTime,
    period_start: OffsetDateTime,
    period_end: OffsetDateTime,
    receipt_ref: Option<String>,
    reviewer_notes: Option<String>,
    submitted_at: Option<OffsetDateTime>,
    reviewed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = BillingError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id,
            tenant_id: row.tenant_id,
            tier_id: row.tier_id,
            number: row.number,
            invoice_type: row.invoice_type.parse::<InvoiceType>()?,
            status: row.status.parse::<InvoiceStatus>()?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            due_date: row.due_date,
            period_start: row.period_start,
            period_end: row.period_end,
            receipt_ref: row.receipt_ref,
            reviewer_notes: row.reviewer_notes,
            submitted_at: row.submitted_at,
            reviewed_at: row.reviewed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    id: Uuid,
    name: String,
    country: String,
    monthly_price_cents: i64,
    currency: String,
    trial_days: i64,
    grace_days: i64,
    max_products: i64,
    max_monthly_orders: i64,
    max_storage_mb: i64,
    active: bool,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the tier catalog. Tiers are operator-owned and read-only to
    /// the engine, so binaries load them once at startup.
    pub async fn fetch_tiers(&self) -> BillingResult<Vec<Tier>> {
        let rows: Vec<TierRow> = sqlx::query_as(
            "SELECT id, name, country, monthly_price_cents, currency, trial_days, \
             grace_days, max_products, max_monthly_orders, max_storage_mb, active \
             FROM tiers",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Tier {
                id: row.id,
                name: row.name,
                country: row.country,
                monthly_price_cents: row.monthly_price_cents,
                currency: row.currency,
                trial_days: row.trial_days,
                grace_days: row.grace_days,
                max_products: row.max_products,
                max_monthly_orders: row.max_monthly_orders,
                max_storage_mb: row.max_storage_mb,
                active: row.active,
            })
            .collect())
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn tenant(&self, tenant_id: Uuid) -> BillingResult<TenantSubscription> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tenant_subscriptions WHERE tenant_id = $1",
            TENANT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::NotFound(format!("Tenant {} not found", tenant_id)))?
            .try_into()
    }

    async fn insert_tenant(&self, tenant: &TenantSubscription) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO tenant_subscriptions \
             (tenant_id, tier_id, status, trial_ends_at, subscription_starts_at, \
              subscription_ends_at, overdue_since, is_payment_overdue, cancel_reason, \
              version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(tenant.tenant_id)
        .bind(tenant.tier_id)
        .bind(tenant.status.as_str())
        .bind(tenant.trial_ends_at)
        .bind(tenant.subscription_starts_at)
        .bind(tenant.subscription_ends_at)
        .bind(tenant.overdue_since)
        .bind(tenant.is_payment_overdue)
        .bind(&tenant.cancel_reason)
        .bind(tenant.version)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tenants_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> BillingResult<Vec<TenantSubscription>> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tenant_subscriptions WHERE status = $1",
            TENANT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_tenant(
        &self,
        tenant: &TenantSubscription,
    ) -> BillingResult<TenantSubscription> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "UPDATE tenant_subscriptions SET \
                 tier_id = $1, status = $2, trial_ends_at = $3, \
                 subscription_starts_at = $4, subscription_ends_at = $5, \
                 overdue_since = $6, is_payment_overdue = $7, cancel_reason = $8, \
                 version = version + 1, updated_at = $9 \
             WHERE tenant_id = $10 AND version = $11 \
             RETURNING {}",
            TENANT_COLUMNS
        ))
        .bind(tenant.tier_id)
        .bind(tenant.status.as_str())
        .bind(tenant.trial_ends_at)
        .bind(tenant.subscription_starts_at)
        .bind(tenant.subscription_ends_at)
        .bind(tenant.overdue_since)
        .bind(tenant.is_payment_overdue)
        .bind(&tenant.cancel_reason)
        .bind(tenant.updated_at)
        .bind(tenant.tenant_id)
        .bind(tenant.version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            BillingError::ConcurrentModification(format!(
                "Tenant {} was modified by another process",
                tenant.tenant_id
            ))
        })?
        .try_into()
    }

    async fn invoice(&self, invoice_id: Uuid) -> BillingResult<Invoice> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE id = $1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::NotFound(format!("Invoice {} not found", invoice_id)))?
            .try_into()
    }

    async fn create_invoice(&self, new_invoice: NewInvoice) -> BillingResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let key = month_key(new_invoice.issued_at);
        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO invoice_sequences (month_key, next_value) VALUES ($1, 1) \
             ON CONFLICT (month_key) \
             DO UPDATE SET next_value = invoice_sequences.next_value + 1 \
             RETURNING next_value",
        )
        .bind(&key)
        .fetch_one(&mut *tx)
        .await?;
        let number = invoice_number(&key, seq);

        let id = Uuid::new_v4();
        // The partial unique index turns a concurrent duplicate into a
        // 23505, surfaced as DuplicateInvoice by the error layer.
        let row: InvoiceRow = sqlx::query_as(&format!(
            "INSERT INTO invoices \
             (id, tenant_id, tier_id, number, invoice_type, status, amount_cents, \
              currency, due_date, period_start, period_end, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $10, $11) \
             RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .bind(new_invoice.tenant_id)
        .bind(new_invoice.tier_id)
        .bind(&number)
        .bind(new_invoice.invoice_type.as_str())
        .bind(new_invoice.amount_cents)
        .bind(&new_invoice.currency)
        .bind(new_invoice.due_date)
        .bind(new_invoice.period_start)
        .bind(new_invoice.period_end)
        .bind(new_invoice.issued_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
    ) -> BillingResult<Invoice> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "UPDATE invoices SET \
                 status = $1, receipt_ref = $2, reviewer_notes = $3, \
                 submitted_at = $4, reviewed_at = $5 \
             WHERE id = $6 AND status = $7 \
             RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(invoice.status.as_str())
        .bind(&invoice.receipt_ref)
        .bind(&invoice.reviewer_notes)
        .bind(invoice.submitted_at)
        .bind(invoice.reviewed_at)
        .bind(invoice.id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            BillingError::InvalidState(format!(
                "Invoice {} is no longer {}",
                invoice.number, expected
            ))
        })?
        .try_into()
    }

    async fn commit_approval(
        &self,
        invoice: &Invoice,
        tenant: &TenantSubscription,
    ) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let invoice_rows = sqlx::query(
            "UPDATE invoices SET status = $1, reviewer_notes = $2, reviewed_at = $3 \
             WHERE id = $4 AND status = 'submitted'",
        )
        .bind(invoice.status.as_str())
        .bind(&invoice.reviewer_notes)
        .bind(invoice.reviewed_at)
        .bind(invoice.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if invoice_rows == 0 {
            return Err(BillingError::InvalidState(format!(
                "Invoice {} is no longer submitted",
                invoice.number
            )));
        }

        let tenant_rows = sqlx::query(
            "UPDATE tenant_subscriptions SET \
                 tier_id = $1, status = $2, subscription_starts_at = $3, \
                 subscription_ends_at = $4, overdue_since = $5, \
                 is_payment_overdue = $6, version = version + 1, updated_at = $7 \
             WHERE tenant_id = $8 AND version = $9",
        )
        .bind(tenant.tier_id)
        .bind(tenant.status.as_str())
        .bind(tenant.subscription_starts_at)
        .bind(tenant.subscription_ends_at)
        .bind(tenant.overdue_since)
        .bind(tenant.is_payment_overdue)
        .bind(tenant.updated_at)
        .bind(tenant.tenant_id)
        .bind(tenant.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if tenant_rows == 0 {
            // Dropping the transaction rolls the invoice update back.
            return Err(BillingError::ConcurrentModification(format!(
                "Tenant {} was modified by another process",
                tenant.tenant_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn all_tenants(&self) -> BillingResult<Vec<TenantSubscription>> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tenant_subscriptions",
            TENANT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn all_invoices(&self) -> BillingResult<Vec<Invoice>> {
        let rows: Vec<InvoiceRow> =
            sqlx::query_as(&format!("SELECT {} FROM invoices", INVOICE_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

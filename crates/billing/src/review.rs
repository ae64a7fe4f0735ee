//! Payment Review Workflow
//!
//! Operator-facing invoice settlement: a tenant owner submits a payment
//! receipt against a pending invoice, and a platform operator approves or
//! rejects it. Approval is the only path that extends a subscription, and
//! it commits the invoice and the tenant record in one atomic store
//! operation - a half-applied approval is a correctness violation.

use std::sync::Arc;

use dukani_shared::{Invoice, InvoiceStatus, TenantSubscription};
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{BillingError, BillingResult};
use crate::lifecycle;
use crate::store::BillingStore;

/// Snapshot returned by every review operation
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub invoice: Invoice,
    pub tenant: TenantSubscription,
}

pub struct ReviewService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore> ReviewService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Attach a payment receipt to a pending invoice and queue it for
    /// review. The receipt reference is opaque to this subsystem.
    pub async fn submit_invoice(
        &self,
        invoice_id: Uuid,
        receipt_ref: &str,
    ) -> BillingResult<ReviewOutcome> {
        if receipt_ref.trim().is_empty() {
            return Err(BillingError::ValidationError(
                "A receipt reference is required to submit an invoice".to_string(),
            ));
        }

        let mut invoice = self.store.invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::Pending {
            return Err(BillingError::InvalidState(format!(
                "Invoice {} is {}, only pending invoices can be submitted",
                invoice.number, invoice.status
            )));
        }

        let now = self.clock.now();
        invoice.status = InvoiceStatus::Submitted;
        invoice.receipt_ref = Some(receipt_ref.to_string());
        invoice.submitted_at = Some(now);
        let invoice = self
            .store
            .update_invoice(&invoice, InvoiceStatus::Pending)
            .await?;

        tracing::info!(
            invoice = %invoice.number,
            tenant_id = %invoice.tenant_id,
            "Invoice submitted for review"
        );

        let tenant = self.store.tenant(invoice.tenant_id).await?;
        Ok(ReviewOutcome { invoice, tenant })
    }

    /// Approve a submitted invoice: mark it approved and apply the
    /// corresponding tenant transition, atomically.
    pub async fn approve_invoice(
        &self,
        invoice_id: Uuid,
        reviewer_notes: Option<String>,
    ) -> BillingResult<ReviewOutcome> {
        let mut invoice = self.store.invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::Submitted {
            return Err(BillingError::InvalidState(format!(
                "Invoice {} is {}, only submitted invoices can be approved",
                invoice.number, invoice.status
            )));
        }

        let mut tenant = self.store.tenant(invoice.tenant_id).await?;
        let now = self.clock.now();
        lifecycle::apply_approval(&mut tenant, &invoice, now)?;

        invoice.status = InvoiceStatus::Approved;
        invoice.reviewer_notes = reviewer_notes;
        invoice.reviewed_at = Some(now);

        self.store.commit_approval(&invoice, &tenant).await?;
        tenant.version += 1; // commit bumped the stored version

        tracing::info!(
            invoice = %invoice.number,
            tenant_id = %tenant.tenant_id,
            tier_id = %tenant.tier_id,
            ends_at = ?tenant.subscription_ends_at,
            "Invoice approved, subscription extended"
        );
        Ok(ReviewOutcome { invoice, tenant })
    }

    /// Reject a submitted invoice. Reviewer notes are mandatory so the
    /// owner knows what to fix; the tenant record is untouched and a new
    /// submission can follow for the same period.
    pub async fn reject_invoice(
        &self,
        invoice_id: Uuid,
        reviewer_notes: &str,
    ) -> BillingResult<ReviewOutcome> {
        if reviewer_notes.trim().is_empty() {
            return Err(BillingError::ValidationError(
                "Rejection requires reviewer notes".to_string(),
            ));
        }

        let mut invoice = self.store.invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::Submitted {
            return Err(BillingError::InvalidState(format!(
                "Invoice {} is {}, only submitted invoices can be rejected",
                invoice.number, invoice.status
            )));
        }

        invoice.status = InvoiceStatus::Rejected;
        invoice.reviewer_notes = Some(reviewer_notes.to_string());
        invoice.reviewed_at = Some(self.clock.now());
        let invoice = self
            .store
            .update_invoice(&invoice, InvoiceStatus::Submitted)
            .await?;

        tracing::info!(
            invoice = %invoice.number,
            tenant_id = %invoice.tenant_id,
            "Invoice rejected"
        );

        let tenant = self.store.tenant(invoice.tenant_id).await?;
        Ok(ReviewOutcome { invoice, tenant })
    }
}

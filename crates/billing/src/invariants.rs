//! Billing Invariants Module
//!
//! Runnable consistency checks over the billing data. These can be run
//! after any automation pass or manual mutation to confirm the system is
//! in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: each invariant is a real scan over the store
//! 2. **Explanatory**: violations carry enough context to debug
//! 3. **Non-destructive**: checks only read, never write

use std::collections::HashMap;
use std::sync::Arc;

use dukani_shared::{InvoiceStatus, SubscriptionStatus};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::BillingResult;
use crate::store::BillingStore;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Tenant(s) affected
    pub tenant_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationSeverity {
    /// Critical - tenants may be billed incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

/// Service for running billing invariant checks
pub struct InvariantChecker<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore> InvariantChecker<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Run all invariant checks and return a summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let mut violations = Vec::new();

        violations.extend(self.check_single_open_invoice_per_period().await?);
        violations.extend(self.check_overdue_marker_consistency().await?);
        violations.extend(self.check_invoice_numbers_unique().await?);
        violations.extend(self.check_active_has_end_date().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();

        Ok(InvariantCheckSummary {
            checked_at: self.clock.now(),
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// At most one non-rejected invoice per (tenant, type, period start).
    /// A second one means a tenant could be billed twice for the same
    /// period.
    async fn check_single_open_invoice_per_period(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let invoices = self.store.all_invoices().await?;
        let mut per_period: HashMap<(Uuid, &'static str, OffsetDateTime), usize> = HashMap::new();
        for invoice in &invoices {
            if invoice.status == InvoiceStatus::Rejected {
                continue;
            }
            *per_period
                .entry((
                    invoice.tenant_id,
                    invoice.invoice_type.as_str(),
                    invoice.period_start,
                ))
                .or_insert(0) += 1;
        }

        Ok(per_period
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(
                |((tenant_id, invoice_type, period_start), count)| InvariantViolation {
                    invariant: "single_open_invoice_per_period".to_string(),
                    tenant_ids: vec![tenant_id],
                    description: format!(
                        "Tenant has {} {} invoices for the period starting {}",
                        count, invoice_type, period_start
                    ),
                    context: serde_json::json!({
                        "invoice_type": invoice_type,
                        "period_start": period_start.to_string(),
                        "count": count,
                    }),
                    severity: ViolationSeverity::Critical,
                },
            )
            .collect())
    }

    /// `overdue_since` is set iff the status is overdue.
    async fn check_overdue_marker_consistency(&self) -> BillingResult<Vec<InvariantViolation>> {
        let tenants = self.store.all_tenants().await?;
        Ok(tenants
            .into_iter()
            .filter(|t| (t.status == SubscriptionStatus::Overdue) != t.overdue_since.is_some())
            .map(|t| InvariantViolation {
                invariant: "overdue_marker_consistency".to_string(),
                tenant_ids: vec![t.tenant_id],
                description: format!(
                    "Tenant is {} but overdue_since is {}",
                    t.status,
                    t.overdue_since
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "null".to_string())
                ),
                context: serde_json::json!({
                    "status": t.status.as_str(),
                    "overdue_since": t.overdue_since.map(|s| s.to_string()),
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invoice numbers never repeat.
    async fn check_invoice_numbers_unique(&self) -> BillingResult<Vec<InvariantViolation>> {
        let invoices = self.store.all_invoices().await?;
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for invoice in &invoices {
            *seen.entry(invoice.number.as_str()).or_insert(0) += 1;
        }

        let mut violations = Vec::new();
        for (number, count) in seen {
            if count > 1 {
                let tenant_ids = invoices
                    .iter()
                    .filter(|i| i.number == number)
                    .map(|i| i.tenant_id)
                    .collect();
                violations.push(InvariantViolation {
                    invariant: "invoice_numbers_unique".to_string(),
                    tenant_ids,
                    description: format!("Invoice number {} appears {} times", number, count),
                    context: serde_json::json!({ "number": number, "count": count }),
                    severity: ViolationSeverity::Critical,
                });
            }
        }
        Ok(violations)
    }

    /// Active tenants must carry a paid-through date and no overdue flag.
    async fn check_active_has_end_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let tenants = self.store.all_tenants().await?;
        Ok(tenants
            .into_iter()
            .filter(|t| {
                t.status == SubscriptionStatus::Active
                    && (t.subscription_ends_at.is_none() || t.is_payment_overdue)
            })
            .map(|t| InvariantViolation {
                invariant: "active_has_end_date".to_string(),
                tenant_ids: vec![t.tenant_id],
                description: "Active tenant without a paid-through date or still flagged overdue"
                    .to_string(),
                context: serde_json::json!({
                    "subscription_ends_at": t.subscription_ends_at.map(|e| e.to_string()),
                    "is_payment_overdue": t.is_payment_overdue,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }
}

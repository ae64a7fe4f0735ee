//! Subscription state machine
//!
//! Pure transition logic over [`TenantSubscription`]. No I/O happens here:
//! callers load the record, apply a transition, and persist the result
//! inside whatever atomicity boundary the mutation path requires. Any
//! transition not expressed by one of these functions is illegal and
//! returns [`BillingError::InvalidState`].

use dukani_shared::{Invoice, InvoiceType, SubscriptionStatus, TenantSubscription};
use time::{Duration, OffsetDateTime};

use crate::error::{BillingError, BillingResult};

/// Every billing period is exactly 30 days; approval extends from the
/// moment of approval, no proration.
pub const BILLING_PERIOD_DAYS: i64 = 30;

pub fn billing_period() -> Duration {
    Duration::days(BILLING_PERIOD_DAYS)
}

/// Whether an approved invoice of `invoice_type` may activate a tenant
/// currently in `status`.
///
/// Trial tenants can only be converted by a `TrialConversion` invoice;
/// paused and cancelled tenants are never reactivated by payment alone.
pub fn approval_allowed(status: SubscriptionStatus, invoice_type: InvoiceType) -> bool {
    match status {
        SubscriptionStatus::Trial => invoice_type == InvoiceType::TrialConversion,
        SubscriptionStatus::Active | SubscriptionStatus::Overdue | SubscriptionStatus::Suspended => {
            true
        }
        SubscriptionStatus::Paused | SubscriptionStatus::Cancelled => false,
    }
}

/// Apply the tenant-state half of an invoice approval.
///
/// Entering `Active` via approval always clears the overdue markers,
/// assigns the invoice's tier, and sets `subscription_ends_at` to exactly
/// `approval_time + 30 days` regardless of the prior value.
pub fn apply_approval(
    tenant: &mut TenantSubscription,
    invoice: &Invoice,
    approval_time: OffsetDateTime,
) -> BillingResult<()> {
    if !approval_allowed(tenant.status, invoice.invoice_type) {
        return Err(BillingError::InvalidState(format!(
            "Cannot apply {} approval to tenant in status {}",
            invoice.invoice_type, tenant.status
        )));
    }

    tenant.status = SubscriptionStatus::Active;
    tenant.tier_id = invoice.tier_id;
    tenant.is_payment_overdue = false;
    tenant.overdue_since = None;
    tenant.subscription_ends_at = Some(approval_time + billing_period());
    if tenant.subscription_starts_at.is_none() {
        tenant.subscription_starts_at = Some(approval_time);
    }
    tenant.updated_at = approval_time;
    Ok(())
}

/// Trial or paid period has lapsed without an approved invoice.
pub fn mark_overdue(tenant: &mut TenantSubscription, now: OffsetDateTime) -> BillingResult<()> {
    let expired = match tenant.status {
        SubscriptionStatus::Trial => tenant.trial_ends_at <= now,
        SubscriptionStatus::Active => tenant
            .subscription_ends_at
            .map(|ends| ends <= now)
            .unwrap_or(false),
        _ => {
            return Err(BillingError::InvalidState(format!(
                "Tenant in status {} cannot become overdue",
                tenant.status
            )))
        }
    };
    if !expired {
        return Err(BillingError::InvalidState(
            "Subscription period has not lapsed yet".to_string(),
        ));
    }

    tenant.status = SubscriptionStatus::Overdue;
    tenant.overdue_since = Some(now);
    tenant.is_payment_overdue = true;
    tenant.updated_at = now;
    Ok(())
}

/// Grace window elapsed while overdue.
pub fn suspend(
    tenant: &mut TenantSubscription,
    grace_days: i64,
    now: OffsetDateTime,
) -> BillingResult<()> {
    if tenant.status != SubscriptionStatus::Overdue {
        return Err(BillingError::InvalidState(format!(
            "Only overdue tenants can be suspended (tenant is {})",
            tenant.status
        )));
    }
    let overdue_since = tenant.overdue_since.ok_or_else(|| {
        BillingError::InvalidState("Overdue tenant is missing overdue_since".to_string())
    })?;
    if overdue_since + Duration::days(grace_days) > now {
        return Err(BillingError::InvalidState(
            "Grace period has not elapsed yet".to_string(),
        ));
    }

    tenant.status = SubscriptionStatus::Suspended;
    // overdue_since tracks the Overdue state only; the unpaid flag carries
    // the debt forward into suspension.
    tenant.overdue_since = None;
    tenant.updated_at = now;
    Ok(())
}

/// Owner pauses their storefront. Only valid while active with paid time
/// remaining.
pub fn pause(tenant: &mut TenantSubscription, now: OffsetDateTime) -> BillingResult<()> {
    if tenant.status != SubscriptionStatus::Active {
        return Err(BillingError::InvalidState(format!(
            "Cannot pause a subscription in status {}",
            tenant.status
        )));
    }
    match tenant.subscription_ends_at {
        Some(ends) if ends > now => {}
        _ => {
            return Err(BillingError::InvalidState(
                "Cannot pause - no paid time remaining".to_string(),
            ))
        }
    }

    tenant.status = SubscriptionStatus::Paused;
    tenant.updated_at = now;
    Ok(())
}

/// Owner resumes a paused storefront. Fails with `ExpiredSubscription` when
/// the paid period ran out while paused - the owner must renew instead.
pub fn resume(tenant: &mut TenantSubscription, now: OffsetDateTime) -> BillingResult<()> {
    if tenant.status != SubscriptionStatus::Paused {
        return Err(BillingError::InvalidState(format!(
            "Cannot resume a subscription in status {}",
            tenant.status
        )));
    }
    match tenant.subscription_ends_at {
        Some(ends) if ends > now => {}
        _ => {
            return Err(BillingError::ExpiredSubscription(format!(
                "tenant {}",
                tenant.tenant_id
            )))
        }
    }

    tenant.status = SubscriptionStatus::Active;
    tenant.updated_at = now;
    Ok(())
}

/// Owner cancels. Terminal; the reason is stored for audit and not
/// otherwise validated.
pub fn cancel(
    tenant: &mut TenantSubscription,
    reason: &str,
    now: OffsetDateTime,
) -> BillingResult<()> {
    match tenant.status {
        SubscriptionStatus::Active | SubscriptionStatus::Overdue | SubscriptionStatus::Paused => {}
        other => {
            return Err(BillingError::InvalidState(format!(
                "Cannot cancel a subscription in status {}",
                other
            )))
        }
    }

    tenant.status = SubscriptionStatus::Cancelled;
    tenant.cancel_reason = Some(reason.to_string());
    tenant.overdue_since = None;
    tenant.is_payment_overdue = false;
    tenant.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dukani_shared::{InvoiceStatus, Tier};
    use uuid::Uuid;

    fn tier() -> Tier {
        Tier {
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
        }
    }

    fn invoice_for(tenant: &TenantSubscription, invoice_type: InvoiceType, now: OffsetDateTime) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            tenant_id: tenant.tenant_id,
            tier_id: tenant.tier_id,
            number: "INV-202508-000001".to_string(),
            invoice_type,
            status: InvoiceStatus::Submitted,
            amount_cents: 150_000,
            currency: "KES".to_string(),
            due_date: now,
            period_start: now,
            period_end: now + billing_period(),
            receipt_ref: None,
            reviewer_notes: None,
            submitted_at: Some(now),
            reviewed_at: None,
            created_at: now,
        }
    }

    fn trial_tenant(now: OffsetDateTime) -> TenantSubscription {
        TenantSubscription::new_trial(Uuid::new_v4(), &tier(), now)
    }

    #[test]
    fn trial_conversion_approval_activates() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        let invoice = invoice_for(&tenant, InvoiceType::TrialConversion, now);

        apply_approval(&mut tenant, &invoice, now).unwrap();
        assert_eq!(tenant.status, SubscriptionStatus::Active);
        assert_eq!(tenant.subscription_ends_at, Some(now + Duration::days(30)));
        assert_eq!(tenant.subscription_starts_at, Some(now));
        assert!(!tenant.is_payment_overdue);
    }

    #[test]
    fn renewal_cannot_convert_a_trial() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        let invoice = invoice_for(&tenant, InvoiceType::Renewal, now);

        let err = apply_approval(&mut tenant, &invoice, now).unwrap_err();
        assert!(matches!(err, BillingError::InvalidState(_)));
        assert_eq!(tenant.status, SubscriptionStatus::Trial);
    }

    #[test]
    fn approval_resets_end_date_regardless_of_prior_value() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        tenant.status = SubscriptionStatus::Active;
        tenant.subscription_starts_at = Some(now - Duration::days(90));
        tenant.subscription_ends_at = Some(now + Duration::days(400));

        let invoice = invoice_for(&tenant, InvoiceType::Renewal, now);
        apply_approval(&mut tenant, &invoice, now).unwrap();
        assert_eq!(tenant.subscription_ends_at, Some(now + Duration::days(30)));
        // First activation timestamp is preserved
        assert_eq!(tenant.subscription_starts_at, Some(now - Duration::days(90)));
    }

    #[test]
    fn approval_reactivates_suspended_tenant() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        tenant.status = SubscriptionStatus::Suspended;
        tenant.overdue_since = None;

        let invoice = invoice_for(&tenant, InvoiceType::Renewal, now);
        apply_approval(&mut tenant, &invoice, now).unwrap();
        assert_eq!(tenant.status, SubscriptionStatus::Active);
    }

    #[test]
    fn approval_never_touches_paused_or_cancelled() {
        let now = OffsetDateTime::now_utc();
        for status in [SubscriptionStatus::Paused, SubscriptionStatus::Cancelled] {
            let mut tenant = trial_tenant(now);
            tenant.status = status;
            let invoice = invoice_for(&tenant, InvoiceType::Renewal, now);
            assert!(apply_approval(&mut tenant, &invoice, now).is_err());
            assert_eq!(tenant.status, status);
        }
    }

    #[test]
    fn overdue_sets_markers_together() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now - Duration::days(20));

        mark_overdue(&mut tenant, now).unwrap();
        assert_eq!(tenant.status, SubscriptionStatus::Overdue);
        assert_eq!(tenant.overdue_since, Some(now));
        assert!(tenant.is_payment_overdue);
    }

    #[test]
    fn overdue_rejected_before_period_lapses() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        assert!(mark_overdue(&mut tenant, now - Duration::days(1)).is_err());

        tenant.status = SubscriptionStatus::Active;
        tenant.subscription_ends_at = Some(now + Duration::days(10));
        assert!(mark_overdue(&mut tenant, now).is_err());
    }

    #[test]
    fn suspension_requires_elapsed_grace() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now - Duration::days(20));
        mark_overdue(&mut tenant, now - Duration::days(3)).unwrap();

        assert!(suspend(&mut tenant, 5, now).is_err());
        suspend(&mut tenant, 2, now).unwrap();
        assert_eq!(tenant.status, SubscriptionStatus::Suspended);
        assert!(tenant.overdue_since.is_none());
        assert!(tenant.is_payment_overdue);
    }

    #[test]
    fn pause_requires_future_paid_time() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        tenant.status = SubscriptionStatus::Active;
        tenant.subscription_ends_at = Some(now - Duration::days(1));
        assert!(pause(&mut tenant, now).is_err());

        tenant.subscription_ends_at = Some(now + Duration::days(10));
        pause(&mut tenant, now).unwrap();
        assert_eq!(tenant.status, SubscriptionStatus::Paused);
    }

    #[test]
    fn resume_after_expiry_is_an_explicit_error() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        tenant.status = SubscriptionStatus::Paused;
        tenant.subscription_ends_at = Some(now - Duration::days(1));

        let err = resume(&mut tenant, now).unwrap_err();
        assert!(matches!(err, BillingError::ExpiredSubscription(_)));
        assert_eq!(tenant.status, SubscriptionStatus::Paused);
    }

    #[test]
    fn cancel_is_terminal_and_records_reason() {
        let now = OffsetDateTime::now_utc();
        let mut tenant = trial_tenant(now);
        tenant.status = SubscriptionStatus::Paused;

        cancel(&mut tenant, "moving off platform", now).unwrap();
        assert_eq!(tenant.status, SubscriptionStatus::Cancelled);
        assert_eq!(tenant.cancel_reason.as_deref(), Some("moving off platform"));

        assert!(cancel(&mut tenant, "again", now).is_err());
        assert!(resume(&mut tenant, now).is_err());
    }
}

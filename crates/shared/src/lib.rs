//! Dukani Shared Types
//!
//! Core billing domain types shared by the engine, the API server, and the
//! background worker: subscription tiers, tenant subscription records,
//! invoices, and their closed status enums. Also provides the database pool
//! and migration helpers used by every binary.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Error returned when parsing a status/type column fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized {field} value '{value}'")]
pub struct ParseEnumError {
    pub field: &'static str,
    pub value: String,
}

/// Lifecycle status of a tenant's subscription
///
/// `Cancelled` is terminal; `Suspended` is reversible only through a fresh
/// approved invoice. Every mutation path goes through the transition table
/// in `dukani-billing::lifecycle`; these variants are never assigned
/// directly by request handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Overdue,
    Suspended,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Overdue => "overdue",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "overdue" => Ok(SubscriptionStatus::Overdue),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "paused" => Ok(SubscriptionStatus::Paused),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(ParseEnumError {
                field: "subscription_status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a billing event is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    TrialConversion,
    Renewal,
    Upgrade,
    Downgrade,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::TrialConversion => "trial_conversion",
            InvoiceType::Renewal => "renewal",
            InvoiceType::Upgrade => "upgrade",
            InvoiceType::Downgrade => "downgrade",
        }
    }
}

impl FromStr for InvoiceType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial_conversion" => Ok(InvoiceType::TrialConversion),
            "renewal" => Ok(InvoiceType::Renewal),
            "upgrade" => Ok(InvoiceType::Upgrade),
            "downgrade" => Ok(InvoiceType::Downgrade),
            other => Err(ParseEnumError {
                field: "invoice_type",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review status of an invoice: `Pending → Submitted → {Approved | Rejected}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Submitted => "submitted",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
        }
    }

    /// An open invoice still counts against the one-invoice-per-period rule
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Submitted)
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "submitted" => Ok(InvoiceStatus::Submitted),
            "approved" => Ok(InvoiceStatus::Approved),
            "rejected" => Ok(InvoiceStatus::Rejected),
            other => Err(ParseEnumError {
                field: "invoice_status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-country subscription plan. Immutable per version; owned by platform
/// operators and read-only to the billing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub id: Uuid,
    pub name: String,
    /// ISO-3166 alpha-2 country the plan is sold in
    pub country: String,
    pub monthly_price_cents: i64,
    pub currency: String,
    pub trial_days: i64,
    /// Days a tenant may stay overdue before suspension
    pub grace_days: i64,
    /// Usage limits; `-1` means no limit
    pub max_products: i64,
    pub max_monthly_orders: i64,
    pub max_storage_mb: i64,
    pub active: bool,
}

/// The authoritative billing record for one tenant.
///
/// `version` implements optimistic locking: every persisted update checks
/// and bumps it, so two concurrent automation runs cannot both apply a
/// transition to the same tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSubscription {
    pub tenant_id: Uuid,
    pub tier_id: Uuid,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub trial_ends_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_starts_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_ends_at: Option<OffsetDateTime>,
    /// Non-null iff `status == Overdue`
    #[serde(with = "time::serde::rfc3339::option")]
    pub overdue_since: Option<OffsetDateTime>,
    pub is_payment_overdue: bool,
    pub cancel_reason: Option<String>,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TenantSubscription {
    /// Record created at tenant signup: in trial on the given tier, trial
    /// clock started now.
    pub fn new_trial(tenant_id: Uuid, tier: &Tier, now: OffsetDateTime) -> Self {
        Self {
            tenant_id,
            tier_id: tier.id,
            status: SubscriptionStatus::Trial,
            trial_ends_at: now + time::Duration::days(tier.trial_days),
            subscription_starts_at: None,
            subscription_ends_at: None,
            overdue_since: None,
            is_payment_overdue: false,
            cancel_reason: None,
            version: 1,
            updated_at: now,
        }
    }
}

/// One billing event requiring manual settlement confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// The tier being billed (may differ from the tenant's current tier for
    /// upgrade/downgrade invoices)
    pub tier_id: Uuid,
    /// Sequential human-readable number, `INV-YYYYMM-NNNNNN`
    pub number: String,
    pub invoice_type: InvoiceType,
    pub status: InvoiceStatus,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    /// Billing period covered, `[period_start, period_end)`
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub period_end: OffsetDateTime,
    /// Opaque receipt URL attached at submission; never inspected
    pub receipt_ref: Option<String>,
    pub reviewer_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submitted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Create a database connection pool for request-serving workloads
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Create a pool with longer timeouts for running migrations
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}

/// Run embedded sqlx migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

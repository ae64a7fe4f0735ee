// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Dukani Billing Engine
//!
//! The subscription lifecycle and invoicing automation engine for the
//! Dukani storefront platform.
//!
//! ## Features
//!
//! - **Subscription State Machine**: trial, active, overdue, suspended,
//!   paused, cancelled - every mutation path shares one transition table
//! - **Invoice Ledger**: append-mostly billing events with sequential
//!   `INV-YYYYMM-NNNNNN` numbering and a one-invoice-per-period guarantee
//! - **Automation Pass**: the idempotent daily sweep that mints trial
//!   conversion and renewal invoices, marks lapsed tenants overdue, and
//!   suspends tenants past their grace window
//! - **Payment Review**: operator approval/rejection of submitted receipts;
//!   approval extends the subscription by exactly 30 days, atomically
//! - **Self-Service Actions**: owner-triggered tier change, pause, resume,
//!   and cancel
//! - **Invariants**: runnable consistency checks over the billing data

pub mod actions;
pub mod automation;
pub mod clock;
pub mod error;
pub mod invariants;
pub mod lifecycle;
pub mod review;
pub mod store;
pub mod tiers;


// Actions
pub use actions::TenantActionService;

// Automation
pub use automation::{AutomationConfig, AutomationService, PassSummary, TenantError};

// Clock
pub use clock::{Clock, FixedClock, SystemClock};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Review
pub use review::{ReviewOutcome, ReviewService};

// Store
pub use store::{BillingStore, MemoryStore, NewInvoice, PgStore};

// Tiers
pub use tiers::{TierCatalog, DEFAULT_GRACE_DAYS};

use std::sync::Arc;

/// Main billing service that combines all billing functionality
pub struct BillingService<S> {
    pub automation: AutomationService<S>,
    pub review: ReviewService<S>,
    pub actions: TenantActionService<S>,
    pub invariants: InvariantChecker<S>,
    pub catalog: TierCatalog,
}

impl<S: BillingStore> BillingService<S> {
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
            automation: AutomationService::with_config(
                store.clone(),
                catalog.clone(),
                clock.clone(),
                config,
            ),
            review: ReviewService::new(store.clone(), clock.clone()),
            actions: TenantActionService::new(store.clone(), catalog.clone(), clock.clone()),
            invariants: InvariantChecker::new(store, clock),
            catalog,
        }
    }
}

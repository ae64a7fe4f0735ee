//! Dukani Background Worker
//!
//! Handles scheduled billing jobs:
//! - Subscription automation pass (daily at 2:00 AM UTC): mints trial
//!   conversion and renewal invoices, marks lapsed tenants overdue, and
//!   suspends tenants past their grace window
//! - Billing invariant checks (daily at 2:30 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use dukani_billing::{
    BillingService, PassSummary, PgStore, SystemClock, TierCatalog,
};
use dukani_shared::create_pool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Log the outcome of an automation pass
fn log_pass_summary(summary: &PassSummary) {
    info!(
        trial_invoices = summary.trial_invoices_created,
        renewal_invoices = summary.renewal_invoices_created,
        marked_overdue = summary.marked_overdue,
        suspended = summary.suspended,
        skipped_existing = summary.skipped_existing,
        errors = summary.errors.len(),
        "Automation pass complete"
    );

    for err in &summary.errors {
        error!(tenant_id = %err.tenant_id, error = %err.message, "Tenant skipped during pass");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    info!("Starting Dukani Worker");

    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&database_url).await?;
    info!("Database pool created");

    let store = Arc::new(PgStore::new(pool));
    let catalog = TierCatalog::from_tiers(store.fetch_tiers().await?);
    if catalog.is_empty() {
        warn!("Tier catalog is empty - automation will skip every tenant");
    } else {
        info!(tiers = catalog.len(), "Tier catalog loaded");
    }

    let billing = Arc::new(BillingService::new(
        store,
        catalog,
        Arc::new(SystemClock),
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription automation pass (daily at 2:00 AM UTC).
    // The pass is idempotent, so a missed or doubled run is safe.
    let automation_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
            let billing = automation_billing.clone();
            Box::pin(async move {
                info!("Running scheduled subscription automation pass");
                match billing.automation.run_pass().await {
                    Ok(summary) => log_pass_summary(&summary),
                    Err(e) => error!(error = %e, "Automation pass failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription automation pass (daily at 2:00 AM UTC)");

    // Job 2: Billing invariant checks (daily at 2:30 AM UTC, after the pass)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 30 2 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                info!("Running billing invariant checks");
                match billing.invariants.run_all_checks().await {
                    Ok(summary) if summary.healthy => {
                        info!(checks_run = summary.checks_run, "All billing invariants hold");
                    }
                    Ok(summary) => {
                        for violation in &summary.violations {
                            error!(
                                invariant = %violation.invariant,
                                severity = ?violation.severity,
                                tenants = ?violation.tenant_ids,
                                "{}", violation.description
                            );
                        }
                        error!(
                            checks_failed = summary.checks_failed,
                            violations = summary.violations.len(),
                            "Billing invariant violations detected"
                        );
                    }
                    Err(e) => error!(error = %e, "Invariant check run failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant checks (daily at 2:30 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Dukani Worker started successfully with 3 scheduled jobs");

    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

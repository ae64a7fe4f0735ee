//! Route definitions

mod admin;
mod tenants;


use axum::routing::{get, post};
use axum::{Json, Router};
use dukani_billing::BillingStore;
use serde_json::{json, Value};

use crate::state::AppState;

/// Build the full application router.
///
/// `/admin/*` routes are for platform operators, `/tenants/*` routes for
/// storefront owners. Authentication sits in front of this service and is
/// not handled here.
pub fn create_router<S: BillingStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tiers/{country}", get(tenants::list_tiers::<S>))
        .route("/admin/invoices/{id}/submit", post(admin::submit_invoice::<S>))
        .route("/admin/invoices/{id}/approve", post(admin::approve_invoice::<S>))
        .route("/admin/invoices/{id}/reject", post(admin::reject_invoice::<S>))
        .route("/admin/automation/run", post(admin::run_automation::<S>))
        .route("/admin/invariants", get(admin::check_invariants::<S>))
        .route("/tenants/{id}/tier-change", post(tenants::tier_change::<S>))
        .route("/tenants/{id}/pause", post(tenants::pause::<S>))
        .route("/tenants/{id}/resume", post(tenants::resume::<S>))
        .route("/tenants/{id}/cancel", post(tenants::cancel::<S>))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

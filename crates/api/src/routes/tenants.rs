//! Storefront owner self-service routes

use axum::extract::{Path, State};
use axum::Json;
use dukani_billing::BillingStore;
use dukani_shared::{Invoice, TenantSubscription, Tier};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TierChangeRequest {
    pub new_tier_id: Uuid,
}

/// Plans a storefront owner in the given country can subscribe to,
/// cheapest first. Inactive plans are hidden.
pub async fn list_tiers<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(country): Path<String>,
) -> Json<Vec<Tier>> {
    let mut tiers: Vec<Tier> = state
        .billing
        .catalog
        .active_for_country(&country)
        .cloned()
        .collect();
    tiers.sort_by_key(|t| t.monthly_price_cents);
    Json(tiers)
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// Request an upgrade or downgrade. Returns the pending invoice; the tier
/// switch happens when payment review approves it.
pub async fn tier_change<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    Json(body): Json<TierChangeRequest>,
) -> ApiResult<Json<Invoice>> {
    let invoice = state
        .billing
        .actions
        .request_tier_change(tenant_id, body.new_tier_id)
        .await?;
    Ok(Json(invoice))
}

pub async fn pause<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<TenantSubscription>> {
    let tenant = state.billing.actions.pause(tenant_id).await?;
    Ok(Json(tenant))
}

pub async fn resume<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<TenantSubscription>> {
    let tenant = state.billing.actions.resume(tenant_id).await?;
    Ok(Json(tenant))
}

pub async fn cancel<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(tenant_id): Path<Uuid>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<Json<TenantSubscription>> {
    let tenant = state.billing.actions.cancel(tenant_id, &body.reason).await?;
    Ok(Json(tenant))
}

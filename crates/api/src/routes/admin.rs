//! Platform operator routes
//!
//! Payment review (submit on behalf of an owner, approve, reject), the
//! manual automation trigger, and the invariant check endpoint.

use axum::extract::{Path, State};
use axum::Json;
use dukani_billing::{
    BillingStore, InvariantCheckSummary, PassSummary, ReviewOutcome,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitPaymentRequest {
    pub receipt_ref: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApproveRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub notes: String,
}

pub async fn submit_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<SubmitPaymentRequest>,
) -> ApiResult<Json<ReviewOutcome>> {
    let outcome = state
        .billing
        .review
        .submit_invoice(invoice_id, &body.receipt_ref)
        .await?;
    Ok(Json(outcome))
}

pub async fn approve_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<ApproveRequest>,
) -> ApiResult<Json<ReviewOutcome>> {
    let outcome = state
        .billing
        .review
        .approve_invoice(invoice_id, body.notes)
        .await?;
    Ok(Json(outcome))
}

pub async fn reject_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> ApiResult<Json<ReviewOutcome>> {
    let outcome = state
        .billing
        .review
        .reject_invoice(invoice_id, &body.notes)
        .await?;
    Ok(Json(outcome))
}

/// Trigger an automation pass outside the worker's schedule. The pass is
/// idempotent, so overlapping with a scheduled run is harmless.
pub async fn run_automation<S: BillingStore>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<PassSummary>> {
    let summary = state.billing.automation.run_pass().await?;
    Ok(Json(summary))
}

pub async fn check_invariants<S: BillingStore>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    let summary = state.billing.invariants.run_all_checks().await?;
    Ok(Json(summary))
}

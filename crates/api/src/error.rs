//! API error type and HTTP status mapping
//!
//! Every handler returns `ApiResult<T>`; the billing error taxonomy maps
//! onto status codes here so handlers never hand-roll responses:
//!
//! - `NotFound` -> 404
//! - `InvalidState`, `ExpiredSubscription`, `DuplicateInvoice`,
//!   `ConcurrentModification` -> 409
//! - `ValidationError` -> 422
//! - everything else -> 500 with the detail kept out of the response

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dukani_billing::BillingError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Billing(BillingError),
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self::Billing(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Billing(err) => {
                let status = match &err {
                    BillingError::NotFound(_) => StatusCode::NOT_FOUND,
                    BillingError::InvalidState(_)
                    | BillingError::ExpiredSubscription(_)
                    | BillingError::DuplicateInvoice(_)
                    | BillingError::ConcurrentModification(_) => StatusCode::CONFLICT,
                    BillingError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    BillingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = ?err, "Billing operation failed");
                    (status, "Internal server error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
            Self::Internal(err) => {
                tracing::error!(error = ?err, "Unhandled internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_errors_map_to_expected_status_codes() {
        let cases = [
            (
                BillingError::NotFound("tenant".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                BillingError::InvalidState("nope".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                BillingError::DuplicateInvoice("exists".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                BillingError::ValidationError("bad input".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}

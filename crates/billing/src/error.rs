//! Billing error taxonomy

use dukani_shared::ParseEnumError;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors surfaced by the billing engine.
///
/// Owner- and admin-facing callers receive these directly; the automation
/// pass records them per tenant and keeps going. `DuplicateInvoice` is an
/// error to direct callers of the mint operations but a benign "another
/// runner got there first" inside the automation pass.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Operation not legal from the current subscription/invoice state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Referenced tenant, tier, or invoice does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resume attempted after the paid period already ended
    #[error("Cannot resume - subscription expired, please renew: {0}")]
    ExpiredSubscription(String),

    /// An open or approved invoice already covers this billing period
    #[error("Duplicate invoice: {0}")]
    DuplicateInvoice(String),

    /// Request payload failed validation (e.g. empty rejection notes)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Optimistic lock failure - the record changed underneath this writer
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        // Unique-constraint violations are the storage half of the
        // check-then-insert contract, not an internal failure.
        if let Some(db_err) = err.as_database_error() {
            if db_err.code().as_deref() == Some("23505") {
                return BillingError::DuplicateInvoice(db_err.message().to_string());
            }
        }
        match err {
            sqlx::Error::RowNotFound => BillingError::NotFound("record not found".to_string()),
            other => BillingError::Database(other.to_string()),
        }
    }
}

impl From<ParseEnumError> for BillingError {
    fn from(err: ParseEnumError) -> Self {
        BillingError::Database(err.to_string())
    }
}

//! Application state

use std::sync::Arc;

use dukani_billing::{BillingService, BillingStore};

/// Shared application state, generic over the billing store so route
/// tests can run against the in-memory store.
pub struct AppState<S> {
    pub billing: Arc<BillingService<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            billing: self.billing.clone(),
        }
    }
}

impl<S: BillingStore> AppState<S> {
    pub fn new(billing: Arc<BillingService<S>>) -> Self {
        Self { billing }
    }
}

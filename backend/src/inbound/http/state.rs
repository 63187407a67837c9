//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain services and ports, and remain testable without I/O.

use std::sync::Arc;

use crate::domain::accounts::AccountService;
use crate::domain::listings::ListingService;
use crate::domain::ports::{ExtendedQueries, ListingStore};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Account use-cases.
    pub accounts: AccountService,
    /// Listing use-cases.
    pub listings: ListingService,
    /// Full-text/JSONB extras; present only when the active backend is the
    /// extended relational variant.
    pub extended: Option<Arc<dyn ExtendedQueries>>,
}

impl HttpState {
    /// Build state over a store, without extended capabilities.
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self {
            accounts: AccountService::new(store.clone()),
            listings: ListingService::new(store),
            extended: None,
        }
    }

    /// Attach the extended-query port.
    #[must_use]
    pub fn with_extended(mut self, extended: Arc<dyn ExtendedQueries>) -> Self {
        self.extended = Some(extended);
        self
    }
}

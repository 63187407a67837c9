//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod extended;
mod store;

pub use extended::{ExtendedQueries, ListingAnalytics, NearbyApartment, OwnerActivity};
pub use store::{ListingFilter, ListingStore, SearchQuery, SearchSort, StoreError, Viewer};

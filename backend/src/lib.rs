//! Apartment-listing backend with swappable storage adapters.
//!
//! The domain layer defines the entities, business services, and a single
//! storage-agnostic store port; outbound adapters implement that port for
//! Diesel/PostgreSQL, MongoDB, and raw-SQL PostgreSQL with full-text
//! search; the inbound HTTP layer maps actix-web requests onto the
//! services; and the migration module copies whole catalogues between any
//! two adapters.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod migration;
pub mod outbound;
pub mod server;

pub use doc::ApiDoc;

//! Aggregate statistics payloads.
//!
//! Every adapter must produce the same numbers for the same data, whatever
//! the underlying aggregation machinery (SQL `COUNT`/`AVG`/`DISTINCT` or a
//! document aggregation pipeline).

use serde::Serialize;
use utoipa::ToSchema;

/// System-wide counters shown on the admin panel.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    /// All registered accounts.
    pub total_users: u64,
    /// Accounts with `is_active = true`.
    pub active_users: u64,
    /// All listings regardless of status.
    pub total_apartments: u64,
    /// Listings awaiting moderation.
    pub pending_apartments: u64,
    /// Approved listings.
    pub approved_apartments: u64,
    /// Rejected listings.
    pub rejected_apartments: u64,
    /// Mean price across approved listings; `0.0` when there are none.
    pub average_price: f64,
    /// Number of distinct accounts owning at least one listing.
    pub total_owners: u64,
}

/// Per-city share of the approved catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CityStats {
    /// City name; listings without a location group under `None`.
    pub city: Option<String>,
    /// Approved listings in that city.
    pub count: u64,
    /// Mean price of those listings.
    pub avg_price: f64,
}

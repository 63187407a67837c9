//! Optional port for the PostgreSQL variant's full-text/JSONB extras.
//!
//! Only the raw-SQL adapter implements this; the HTTP layer holds an
//! `Option` of it and answers 404 when the active backend has no such
//! capability. Keeping these operations out of [`super::ListingStore`]
//! keeps the common interface honest: features, coordinates, and the
//! analytic queries simply do not exist in the other variants.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Apartment, ApartmentId, LocationId};

use super::StoreError;

/// Aggregate figures computed over the whole listings table.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListingAnalytics {
    /// All listings regardless of status.
    pub total_count: u64,
    /// Mean price.
    pub avg_price: f64,
    /// Cheapest listing.
    pub min_price: f64,
    /// Most expensive listing.
    pub max_price: f64,
    /// Median price (continuous percentile).
    pub median_price: f64,
    /// Distinct owning accounts.
    pub unique_owners: u64,
    /// Distinct referenced addresses.
    pub unique_locations: u64,
    /// Approved listings.
    pub approved_count: u64,
    /// Pending listings.
    pub pending_count: u64,
    /// Rejected listings.
    pub rejected_count: u64,
    /// City with the most listings, when any listing has an address.
    pub most_common_city: Option<String>,
}

/// Per-account activity row, ranked by listing count.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerActivity {
    /// Account identifier.
    pub user_id: String,
    /// Account email.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Listings owned.
    pub apartment_count: u64,
    /// Most recent listing creation time.
    pub last_apartment_created: Option<DateTime<Utc>>,
    /// Earliest listing creation time.
    pub first_apartment_created: Option<DateTime<Utc>>,
    /// Mean price across the account's listings.
    pub avg_price: Option<f64>,
    /// Approved listings owned.
    pub approved_count: u64,
    /// Rejected listings owned.
    pub rejected_count: u64,
    /// Dense rank by listing count (1 = most listings).
    pub rank_by_count: u64,
}

/// A listing paired with its distance from a search origin.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearbyApartment {
    /// The listing itself.
    pub apartment: Apartment,
    /// Great-circle distance from the query point, in kilometres.
    pub distance_km: f64,
}

/// Full-text/JSONB operations available only on the extended relational
/// backend.
#[async_trait]
pub trait ExtendedQueries: Send + Sync {
    /// Merge the given key/value pairs into the listing's `features` JSONB
    /// column; `false` when the id does not resolve.
    async fn update_features(
        &self,
        id: &ApartmentId,
        features: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError>;

    /// Approved listings whose features contain every given key/value pair.
    async fn apartments_with_features(
        &self,
        features: &BTreeMap<String, String>,
    ) -> Result<Vec<Apartment>, StoreError>;

    /// Store geocoordinates on an address; `false` when the id does not
    /// resolve.
    async fn set_coordinates(
        &self,
        location: &LocationId,
        lat: f64,
        lon: f64,
    ) -> Result<bool, StoreError>;

    /// Approved listings within `radius_km` of the given point, nearest
    /// first. Only addresses with stored coordinates participate.
    async fn nearby_apartments(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<NearbyApartment>, StoreError>;

    /// Percentile/aggregate figures over the listings table.
    async fn listing_analytics(&self) -> Result<ListingAnalytics, StoreError>;

    /// Per-owner activity ranking (top 20).
    async fn owner_activity(&self) -> Result<Vec<OwnerActivity>, StoreError>;
}

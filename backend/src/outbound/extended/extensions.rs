//! JSONB and analytics operations on the raw-SQL PostgreSQL adapter.
//!
//! These exist only in this variant: listing features live in a JSONB
//! column merged with the `||` operator, address coordinates in a JSONB
//! object, and the analytics use `percentile_cont`, `FILTER` counts, and
//! window functions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::domain::ports::{
    ExtendedQueries, ListingAnalytics, NearbyApartment, OwnerActivity, StoreError,
};
use crate::domain::{Apartment, ApartmentId, LocationId};

use super::rows::{APARTMENT_COLUMNS, apartment_from_row, get, map_sqlx_error};
use super::store::SqlxStore;

fn features_json(features: &BTreeMap<String, String>) -> Value {
    Value::Object(
        features
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect::<Map<_, _>>(),
    )
}

fn lookup_key(raw: &str) -> Option<i32> {
    raw.parse().ok()
}

#[async_trait]
impl ExtendedQueries for SqlxStore {
    async fn update_features(
        &self,
        id: &ApartmentId,
        features: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(false);
        };
        let outcome = sqlx::query(
            "UPDATE apartments SET features = features || $1::jsonb WHERE id = $2 RETURNING id",
        )
        .bind(features_json(features))
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(outcome.is_some())
    }

    async fn apartments_with_features(
        &self,
        features: &BTreeMap<String, String>,
    ) -> Result<Vec<Apartment>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments a \
             LEFT JOIN locations l ON a.location_id = l.id \
             WHERE a.status = 'approved'"
        ));
        for (key, value) in features {
            builder
                .push(" AND a.features ->> ")
                .push_bind(key.clone())
                .push(" = ")
                .push_bind(value.clone());
        }
        builder.push(" ORDER BY a.id");

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(apartment_from_row).collect()
    }

    async fn set_coordinates(
        &self,
        location: &LocationId,
        lat: f64,
        lon: f64,
    ) -> Result<bool, StoreError> {
        let Some(key) = lookup_key(location.as_str()) else {
            return Ok(false);
        };
        let outcome = sqlx::query(
            "UPDATE locations \
             SET coordinates = jsonb_build_object('lat', $1::float8, 'lon', $2::float8) \
             WHERE id = $3 RETURNING id",
        )
        .bind(lat)
        .bind(lon)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(outcome.is_some())
    }

    async fn nearby_apartments(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<NearbyApartment>, StoreError> {
        // Great-circle distance over the JSONB coordinates; the acos input
        // is clamped against floating-point drift at the poles.
        let sql = format!(
            "SELECT * FROM ( \
                 SELECT {APARTMENT_COLUMNS}, \
                        (6371 * acos(least(1.0, greatest(-1.0, \
                            cos(radians($1)) * \
                            cos(radians((l.coordinates->>'lat')::float8)) * \
                            cos(radians((l.coordinates->>'lon')::float8) - radians($2)) + \
                            sin(radians($1)) * \
                            sin(radians((l.coordinates->>'lat')::float8)))))) AS distance \
                 FROM apartments a \
                 JOIN locations l ON a.location_id = l.id \
                 WHERE l.coordinates IS NOT NULL AND a.status = 'approved' \
             ) nearby WHERE distance <= $3 ORDER BY distance",
        );
        let rows = sqlx::query(&sql)
            .bind(lat)
            .bind(lon)
            .bind(radius_km)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(|row| {
                Ok(NearbyApartment {
                    apartment: apartment_from_row(row)?,
                    distance_km: get(row, "distance")?,
                })
            })
            .collect()
    }

    async fn listing_analytics(&self) -> Result<ListingAnalytics, StoreError> {
        let row = sqlx::query(
            "SELECT \
                 COUNT(*) AS total_count, \
                 COALESCE(AVG(price), 0) AS avg_price, \
                 COALESCE(MIN(price), 0) AS min_price, \
                 COALESCE(MAX(price), 0) AS max_price, \
                 COALESCE(PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY price), 0) AS median_price, \
                 COUNT(DISTINCT owner_id) AS unique_owners, \
                 COUNT(DISTINCT location_id) AS unique_locations, \
                 COUNT(*) FILTER (WHERE status = 'approved') AS approved_count, \
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending_count, \
                 COUNT(*) FILTER (WHERE status = 'rejected') AS rejected_count, \
                 MODE() WITHIN GROUP (ORDER BY location_id) AS most_common_location_id \
             FROM apartments",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let count = |column: &str| -> Result<u64, StoreError> {
            let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
            Ok(value.unsigned_abs())
        };

        let most_common_location: Option<i32> = get(&row, "most_common_location_id")?;
        let most_common_city = match most_common_location {
            Some(location_id) => {
                let city = sqlx::query("SELECT city FROM locations WHERE id = $1")
                    .bind(location_id)
                    .fetch_optional(self.pool())
                    .await
                    .map_err(map_sqlx_error)?;
                city.as_ref().map(|row| get(row, "city")).transpose()?
            }
            None => None,
        };

        Ok(ListingAnalytics {
            total_count: count("total_count")?,
            avg_price: get(&row, "avg_price")?,
            min_price: get(&row, "min_price")?,
            max_price: get(&row, "max_price")?,
            median_price: get(&row, "median_price")?,
            unique_owners: count("unique_owners")?,
            unique_locations: count("unique_locations")?,
            approved_count: count("approved_count")?,
            pending_count: count("pending_count")?,
            rejected_count: count("rejected_count")?,
            most_common_city,
        })
    }

    async fn owner_activity(&self) -> Result<Vec<OwnerActivity>, StoreError> {
        let rows = sqlx::query(
            "SELECT \
                 u.id AS user_id, u.email, u.first_name, u.last_name, \
                 COUNT(a.id) AS apartment_count, \
                 MAX(a.created_at) AS last_apartment_created, \
                 MIN(a.created_at) AS first_apartment_created, \
                 AVG(a.price) AS avg_price, \
                 COUNT(a.id) FILTER (WHERE a.status = 'approved') AS approved_count, \
                 COUNT(a.id) FILTER (WHERE a.status = 'rejected') AS rejected_count, \
                 RANK() OVER (ORDER BY COUNT(a.id) DESC) AS rank_by_count \
             FROM users u \
             LEFT JOIN apartments a ON u.id = a.owner_id \
             GROUP BY u.id, u.email, u.first_name, u.last_name \
             ORDER BY apartment_count DESC \
             LIMIT 20",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let user_id: i32 = get(row, "user_id")?;
                let apartment_count: i64 = get(row, "apartment_count")?;
                let approved_count: i64 = get(row, "approved_count")?;
                let rejected_count: i64 = get(row, "rejected_count")?;
                let rank: i64 = get(row, "rank_by_count")?;
                Ok(OwnerActivity {
                    user_id: user_id.to_string(),
                    email: get(row, "email")?,
                    first_name: get(row, "first_name")?,
                    last_name: get(row, "last_name")?,
                    apartment_count: apartment_count.unsigned_abs(),
                    last_apartment_created: get(row, "last_apartment_created")?,
                    first_apartment_created: get(row, "first_apartment_created")?,
                    avg_price: get(row, "avg_price")?,
                    approved_count: approved_count.unsigned_abs(),
                    rejected_count: rejected_count.unsigned_abs(),
                    rank_by_count: rank.unsigned_abs(),
                })
            })
            .collect()
    }
}

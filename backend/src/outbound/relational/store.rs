//! PostgreSQL-backed [`ListingStore`] implementation using Diesel ORM.
//!
//! A thin adapter: it only translates between Diesel rows and domain types
//! and maps backend failures to [`StoreError`]. Business rules live in the
//! services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::warn;

use crate::domain::ports::{
    ListingFilter, ListingStore, SearchQuery, SearchSort, StoreError, Viewer,
};
use crate::domain::{
    Apartment, ApartmentId, ApartmentPatch, CityStats, ListingStatus, Location, LocationId,
    LocationKey, NewApartment, NewUser, SystemStats, User, UserId,
};

use super::error_map::{map_diesel_error, map_pool_error};
use super::models::{
    ApartmentChanges, ApartmentRow, LocationRow, NewApartmentRow, NewLocationRow,
    NewObservationRow, NewUserRow, UserRow, UserUpsertChanges, apartment_from_rows,
};
use super::pool::{DbPool, PoolConfig};
use super::schema::{apartments, locations, observations, users};

/// SQL migrations embedded from `backend/migrations/`.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Diesel/PostgreSQL implementation of the listing store.
#[derive(Clone)]
pub struct DieselStore {
    pool: DbPool,
}

impl DieselStore {
    /// Build a store over an existing pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Connect to the given database URL with default pool settings.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = DbPool::new(PoolConfig::new(database_url))
            .await
            .map_err(map_pool_error)?;
        Ok(Self::new(pool))
    }
}

/// Parse a domain identifier into a serial key; `None` means the id cannot
/// exist in this store.
fn lookup_key(raw: &str) -> Option<i32> {
    raw.parse().ok()
}

/// Parse a referenced identifier that must resolve, e.g. an owner id on
/// insert.
fn reference_key(raw: &str, what: &str) -> Result<i32, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::query(format!("unparseable {what}: {raw}")))
}

async fn count_status(
    conn: &mut AsyncPgConnection,
    status: ListingStatus,
) -> Result<i64, StoreError> {
    apartments::table
        .filter(apartments::status.eq(status.as_str()))
        .select(diesel::dsl::count_star())
        .first(conn)
        .await
        .map_err(map_diesel_error)
}

async fn fetch_apartment(
    conn: &mut AsyncPgConnection,
    key: i32,
) -> Result<Option<Apartment>, StoreError> {
    let row: Option<(ApartmentRow, Option<LocationRow>)> = apartments::table
        .left_join(locations::table)
        .filter(apartments::id.eq(key))
        .select((ApartmentRow::as_select(), Option::<LocationRow>::as_select()))
        .first(conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
    Ok(row.map(|(apartment, location)| apartment_from_rows(apartment, location)))
}

#[async_trait]
impl ListingStore for DieselStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let url = self.pool.database_url().to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut conn = diesel::pg::PgConnection::establish(&url)
                .map_err(|err| StoreError::connection(err.to_string()))?;
            conn.run_pending_migrations(MIGRATIONS)
                .map(|_| ())
                .map_err(|err| StoreError::query(format!("migrations failed: {err}")))
        })
        .await
        .map_err(|err| StoreError::query(format!("migration task panicked: {err}")))?
    }

    async fn insert_user(&self, record: &NewUser) -> Result<User, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: UserRow = diesel::insert_into(users::table)
            .values(NewUserRow::from_record(record))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row.into())
    }

    async fn upsert_user_by_email(&self, record: &NewUser) -> Result<User, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: UserRow = diesel::insert_into(users::table)
            .values(NewUserRow::from_record(record))
            .on_conflict(users::email)
            .do_update()
            .set(UserUpsertChanges::from_record(record))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row.into())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .filter(users::email.eq(email))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(User::from))
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .find(key)
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(User::from))
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        active: bool,
    ) -> Result<Option<User>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = diesel::update(users::table.find(key))
            .set(users::is_active.eq(active))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(User::from))
    }

    async fn touch_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(());
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(users::table.find(key))
            .set(users::last_login.eq(Some(at)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<UserRow> = users::table
            .order(users::id.asc())
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_or_create_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let existing: Option<LocationRow> = locations::table
            .filter(locations::city.eq(&key.city))
            .filter(locations::street.eq(&key.street))
            .filter(locations::house_number.eq(&key.house_number))
            .select(LocationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        // Insert may lose a race against a concurrent create of the same
        // triple; fall back to the row the winner committed.
        let inserted: Option<LocationRow> = diesel::insert_into(locations::table)
            .values(NewLocationRow {
                city: &key.city,
                street: &key.street,
                house_number: &key.house_number,
            })
            .on_conflict((locations::city, locations::street, locations::house_number))
            .do_nothing()
            .returning(LocationRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        if let Some(row) = inserted {
            return Ok(row.into());
        }

        let row: LocationRow = locations::table
            .filter(locations::city.eq(&key.city))
            .filter(locations::street.eq(&key.street))
            .filter(locations::house_number.eq(&key.house_number))
            .select(LocationRow::as_select())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row.into())
    }

    async fn insert_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: LocationRow = diesel::insert_into(locations::table)
            .values(NewLocationRow {
                city: &key.city,
                street: &key.street,
                house_number: &key.house_number,
            })
            .returning(LocationRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row.into())
    }

    async fn location_by_id(&self, id: &LocationId) -> Result<Option<Location>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LocationRow> = locations::table
            .find(key)
            .select(LocationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(Location::from))
    }

    async fn update_location(
        &self,
        id: &LocationId,
        key: &LocationKey,
    ) -> Result<Option<Location>, StoreError> {
        let Some(row_id) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<LocationRow> = diesel::update(locations::table.find(row_id))
            .set((
                locations::city.eq(&key.city),
                locations::street.eq(&key.street),
                locations::house_number.eq(&key.house_number),
            ))
            .returning(LocationRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(Location::from))
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<LocationRow> = locations::table
            .order(locations::id.asc())
            .select(LocationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn insert_apartment(&self, record: &NewApartment) -> Result<Apartment, StoreError> {
        let owner_id = reference_key(record.owner_id.as_str(), "owner id")?;
        let location_id = record
            .location_id
            .as_ref()
            .map(|id| reference_key(id.as_str(), "location id"))
            .transpose()?;
        let moderated_by = record
            .moderated_by
            .as_ref()
            .and_then(|id| lookup_key(id.as_str()));

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: ApartmentRow = diesel::insert_into(apartments::table)
            .values(NewApartmentRow {
                title: &record.title,
                description: &record.description,
                price: record.price,
                owner_id,
                location_id,
                status: record.status.as_str(),
                created_at: record.created_at,
                updated_at: record.updated_at,
                moderated_by,
                moderated_at: record.moderated_at,
            })
            .returning(ApartmentRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        fetch_apartment(&mut conn, row.id)
            .await?
            .ok_or_else(|| StoreError::query("inserted apartment vanished"))
    }

    async fn apartment_by_id(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        fetch_apartment(&mut conn, key).await
    }

    async fn update_apartment(
        &self,
        id: &ApartmentId,
        patch: &ApartmentPatch,
    ) -> Result<Option<Apartment>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let current_location: Option<Option<i32>> = apartments::table
            .find(key)
            .select(apartments::location_id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        let Some(current_location) = current_location else {
            return Ok(None);
        };

        if let Some(new_key) = &patch.location {
            match current_location {
                Some(location_id) => {
                    diesel::update(locations::table.find(location_id))
                        .set((
                            locations::city.eq(&new_key.city),
                            locations::street.eq(&new_key.street),
                            locations::house_number.eq(&new_key.house_number),
                        ))
                        .execute(&mut conn)
                        .await
                        .map_err(map_diesel_error)?;
                }
                None => {
                    // The listing lost its address row at some point; attach
                    // a fresh one rather than silently dropping the edit.
                    let row: LocationRow = diesel::insert_into(locations::table)
                        .values(NewLocationRow {
                            city: &new_key.city,
                            street: &new_key.street,
                            house_number: &new_key.house_number,
                        })
                        .returning(LocationRow::as_returning())
                        .get_result(&mut conn)
                        .await
                        .map_err(map_diesel_error)?;
                    diesel::update(apartments::table.find(key))
                        .set(apartments::location_id.eq(Some(row.id)))
                        .execute(&mut conn)
                        .await
                        .map_err(map_diesel_error)?;
                }
            }
        }

        diesel::update(apartments::table.find(key))
            .set(ApartmentChanges {
                title: patch.title.as_deref(),
                description: patch.description.as_deref(),
                price: patch.price,
                updated_at: Utc::now(),
            })
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        fetch_apartment(&mut conn, key).await
    }

    async fn delete_apartment(&self, id: &ApartmentId) -> Result<bool, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(false);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(apartments::table.find(key))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn apartments_by_owner(&self, owner: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let Some(owner_key) = lookup_key(owner.as_str()) else {
            return Ok(Vec::new());
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(ApartmentRow, Option<LocationRow>)> = apartments::table
            .left_join(locations::table)
            .filter(apartments::owner_id.eq(owner_key))
            .order(apartments::id.asc())
            .select((ApartmentRow::as_select(), Option::<LocationRow>::as_select()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(|(apartment, location)| apartment_from_rows(apartment, location))
            .collect())
    }

    async fn list_apartments(&self, filter: &ListingFilter) -> Result<Vec<Apartment>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = apartments::table
            .inner_join(users::table)
            .left_join(locations::table)
            .select((ApartmentRow::as_select(), Option::<LocationRow>::as_select()))
            .into_boxed();

        if !filter.viewer.is_admin() {
            query = query
                .filter(apartments::status.eq(ListingStatus::Approved.as_str()))
                .filter(users::is_active.eq(true));
        }

        let rows: Vec<(ApartmentRow, Option<LocationRow>)> = query
            .order(apartments::id.asc())
            .offset(i64::try_from(filter.skip).unwrap_or(i64::MAX))
            .limit(i64::try_from(filter.limit).unwrap_or(i64::MAX))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(|(apartment, location)| apartment_from_rows(apartment, location))
            .collect())
    }

    async fn pending_apartments(&self) -> Result<Vec<Apartment>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(ApartmentRow, Option<LocationRow>)> = apartments::table
            .left_join(locations::table)
            .filter(apartments::status.eq(ListingStatus::Pending.as_str()))
            .order(apartments::id.asc())
            .select((ApartmentRow::as_select(), Option::<LocationRow>::as_select()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(|(apartment, location)| apartment_from_rows(apartment, location))
            .collect())
    }

    async fn moderate_apartment(
        &self,
        id: &ApartmentId,
        status: ListingStatus,
        moderator: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Apartment>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let moderator_key = lookup_key(moderator.as_str());
        if moderator_key.is_none() {
            warn!(moderator = %moderator, "moderator id does not parse for this store");
        }

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(apartments::table.find(key))
            .set((
                apartments::status.eq(status.as_str()),
                apartments::moderated_by.eq(moderator_key),
                apartments::moderated_at.eq(Some(at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Ok(None);
        }
        fetch_apartment(&mut conn, key).await
    }

    async fn search_apartments(
        &self,
        query: &SearchQuery,
        viewer: &Viewer,
    ) -> Result<Vec<Apartment>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut sql = apartments::table
            .inner_join(users::table)
            .left_join(locations::table)
            .select((ApartmentRow::as_select(), Option::<LocationRow>::as_select()))
            .into_boxed();

        if !viewer.is_admin() {
            sql = sql
                .filter(apartments::status.eq(ListingStatus::Approved.as_str()))
                .filter(users::is_active.eq(true));
        }
        if let Some(text) = query.text.as_deref().filter(|text| !text.trim().is_empty()) {
            let pattern = format!("%{text}%");
            sql = sql.filter(
                apartments::title
                    .ilike(pattern.clone())
                    .or(apartments::description.ilike(pattern)),
            );
        }
        if let Some(min) = query.min_price {
            sql = sql.filter(apartments::price.ge(min));
        }
        if let Some(max) = query.max_price {
            sql = sql.filter(apartments::price.le(max));
        }
        if let Some(city) = query.city.as_deref().filter(|city| !city.is_empty()) {
            sql = sql.filter(locations::city.nullable().ilike(format!("%{city}%")));
        }
        sql = match query.sort {
            Some(SearchSort::PriceAscending) => sql.order(apartments::price.asc()),
            Some(SearchSort::PriceDescending) => sql.order(apartments::price.desc()),
            Some(SearchSort::Newest) => sql.order(apartments::created_at.desc()),
            Some(SearchSort::Oldest) => sql.order(apartments::created_at.asc()),
            None => sql.order(apartments::id.asc()),
        };

        let rows: Vec<(ApartmentRow, Option<LocationRow>)> =
            sql.load(&mut conn).await.map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(|(apartment, location)| apartment_from_rows(apartment, location))
            .collect())
    }

    async fn observe(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let (Some(user_key), Some(apartment_key)) =
            (lookup_key(user.as_str()), lookup_key(apartment.as_str()))
        else {
            return Ok(false);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let inserted = diesel::insert_into(observations::table)
            .values(NewObservationRow {
                user_id: user_key,
                apartment_id: apartment_key,
                created_at: Utc::now(),
            })
            .on_conflict((observations::user_id, observations::apartment_id))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(inserted > 0)
    }

    async fn unobserve(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let (Some(user_key), Some(apartment_key)) =
            (lookup_key(user.as_str()), lookup_key(apartment.as_str()))
        else {
            return Ok(false);
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            observations::table
                .filter(observations::user_id.eq(user_key))
                .filter(observations::apartment_id.eq(apartment_key)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn observed_apartments(&self, user: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let Some(user_key) = lookup_key(user.as_str()) else {
            return Ok(Vec::new());
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(ApartmentRow, Option<LocationRow>)> = observations::table
            .inner_join(apartments::table.left_join(locations::table))
            .filter(observations::user_id.eq(user_key))
            .order(observations::id.asc())
            .select((ApartmentRow::as_select(), Option::<LocationRow>::as_select()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(|(apartment, location)| apartment_from_rows(apartment, location))
            .collect())
    }

    async fn system_stats(&self) -> Result<SystemStats, StoreError> {
        use diesel::dsl::{avg, count_distinct, count_star};

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let total_users: i64 = users::table
            .select(count_star())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let active_users: i64 = users::table
            .filter(users::is_active.eq(true))
            .select(count_star())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let total_apartments: i64 = apartments::table
            .select(count_star())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let pending_apartments = count_status(&mut conn, ListingStatus::Pending).await?;
        let approved_apartments = count_status(&mut conn, ListingStatus::Approved).await?;
        let rejected_apartments = count_status(&mut conn, ListingStatus::Rejected).await?;

        let average_price: Option<f64> = apartments::table
            .filter(apartments::status.eq(ListingStatus::Approved.as_str()))
            .select(avg(apartments::price))
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let total_owners: i64 = apartments::table
            .select(count_distinct(apartments::owner_id))
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(SystemStats {
            total_users: total_users.unsigned_abs(),
            active_users: active_users.unsigned_abs(),
            total_apartments: total_apartments.unsigned_abs(),
            pending_apartments: pending_apartments.unsigned_abs(),
            approved_apartments: approved_apartments.unsigned_abs(),
            rejected_apartments: rejected_apartments.unsigned_abs(),
            average_price: average_price.unwrap_or(0.0),
            total_owners: total_owners.unsigned_abs(),
        })
    }

    async fn city_distribution(&self) -> Result<Vec<CityStats>, StoreError> {
        use diesel::dsl::{avg, count_star};

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(String, i64, Option<f64>)> = apartments::table
            .inner_join(locations::table)
            .filter(apartments::status.eq(ListingStatus::Approved.as_str()))
            .group_by(locations::city)
            .select((locations::city, count_star(), avg(apartments::price)))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let mut stats: Vec<CityStats> = rows
            .into_iter()
            .map(|(city, count, avg_price)| CityStats {
                city: Some(city),
                count: count.unsigned_abs(),
                avg_price: avg_price.unwrap_or(0.0),
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(stats)
    }
}

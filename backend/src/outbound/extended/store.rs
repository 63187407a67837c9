//! Raw-SQL PostgreSQL [`ListingStore`] with full-text search.
//!
//! This variant leans on PostgreSQL features the ORM adapter does not use:
//! a trigger-maintained `tsvector` over title/description, JSONB columns for
//! listing features and address coordinates, and `FILTER` aggregates for
//! statistics. The JSONB/analytics operations live in the sibling
//! `extensions` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::domain::ports::{
    ListingFilter, ListingStore, SearchQuery, SearchSort, StoreError, Viewer,
};
use crate::domain::{
    Apartment, ApartmentId, ApartmentPatch, CityStats, ListingStatus, Location, LocationId,
    LocationKey, NewApartment, NewUser, SystemStats, User, UserId,
};

use super::rows::{
    APARTMENT_COLUMNS, apartment_from_row, get, location_from_row, map_sqlx_error, user_from_row,
};

/// Schema DDL, applied idempotently at startup and after migrations.
///
/// The search-vector trigger weighs titles above descriptions; existing
/// rows are backfilled so a freshly patched database searches immediately.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    email VARCHAR(100) NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    first_name VARCHAR(100) NOT NULL,
    last_name VARCHAR(100) NOT NULL,
    phone VARCHAR(20) NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT FALSE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    last_login TIMESTAMPTZ,
    profile_data JSONB NOT NULL DEFAULT '{}'
);

CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (email);

CREATE TABLE IF NOT EXISTS locations (
    id SERIAL PRIMARY KEY,
    city VARCHAR(100) NOT NULL,
    street VARCHAR(100) NOT NULL,
    house_number VARCHAR(20) NOT NULL,
    coordinates JSONB
);

CREATE UNIQUE INDEX IF NOT EXISTS locations_natural_key
    ON locations (city, street, house_number);

CREATE TABLE IF NOT EXISTS apartments (
    id SERIAL PRIMARY KEY,
    title VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    price DOUBLE PRECISION NOT NULL,
    owner_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    location_id INTEGER REFERENCES locations (id) ON DELETE SET NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    moderated_by INTEGER REFERENCES users (id) ON DELETE SET NULL,
    moderated_at TIMESTAMPTZ,
    features JSONB NOT NULL DEFAULT '{}',
    search_vector TSVECTOR
);

CREATE INDEX IF NOT EXISTS apartments_owner_idx ON apartments (owner_id);
CREATE INDEX IF NOT EXISTS apartments_status_idx ON apartments (status);
CREATE INDEX IF NOT EXISTS apartments_search_idx
    ON apartments USING GIN (search_vector);
CREATE INDEX IF NOT EXISTS apartments_features_idx
    ON apartments USING GIN (features);

CREATE TABLE IF NOT EXISTS observations (
    id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    apartment_id INTEGER NOT NULL REFERENCES apartments (id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS observations_pair_key
    ON observations (user_id, apartment_id);

CREATE OR REPLACE FUNCTION apartments_search_vector_update() RETURNS TRIGGER AS $$
BEGIN
    NEW.search_vector =
        setweight(to_tsvector('english', COALESCE(NEW.title, '')), 'A') ||
        setweight(to_tsvector('english', COALESCE(NEW.description, '')), 'B');
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS apartments_search_vector_update ON apartments;
CREATE TRIGGER apartments_search_vector_update
BEFORE INSERT OR UPDATE OF title, description
ON apartments
FOR EACH ROW
EXECUTE FUNCTION apartments_search_vector_update();

UPDATE apartments SET
    search_vector = setweight(to_tsvector('english', COALESCE(title, '')), 'A') ||
                    setweight(to_tsvector('english', COALESCE(description, '')), 'B')
WHERE search_vector IS NULL;
";

/// Raw-SQL PostgreSQL implementation of the listing store.
#[derive(Clone)]
pub struct SqlxStore {
    pool: PgPool,
}

fn lookup_key(raw: &str) -> Option<i32> {
    raw.parse().ok()
}

fn reference_key(raw: &str, what: &str) -> Result<i32, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::query(format!("unparseable {what}: {raw}")))
}

impl SqlxStore {
    /// Connect to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::connection(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Build a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_apartment(&self, key: i32) -> Result<Option<Apartment>, StoreError> {
        let sql = format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments a \
             LEFT JOIN locations l ON a.location_id = l.id WHERE a.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(apartment_from_row).transpose()
    }

    async fn location_row(&self, key: i32) -> Result<Option<Location>, StoreError> {
        let row = sqlx::query("SELECT id, city, street, house_number FROM locations WHERE id = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(location_from_row).transpose()
    }
}

#[async_trait]
impl ListingStore for SqlxStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_user(&self, record: &NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users \
             (email, password_hash, first_name, last_name, phone, is_admin, is_active, created_at, last_login) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, email, password_hash, first_name, last_name, phone, is_admin, is_active, created_at, last_login",
        )
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.phone)
        .bind(record.is_admin)
        .bind(record.is_active)
        .bind(record.created_at)
        .bind(record.last_login)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        user_from_row(&row)
    }

    async fn upsert_user_by_email(&self, record: &NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users \
             (email, password_hash, first_name, last_name, phone, is_admin, is_active, created_at, last_login) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (email) DO UPDATE SET \
                 password_hash = EXCLUDED.password_hash, \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 phone = EXCLUDED.phone, \
                 is_admin = EXCLUDED.is_admin, \
                 is_active = EXCLUDED.is_active, \
                 created_at = EXCLUDED.created_at, \
                 last_login = EXCLUDED.last_login \
             RETURNING id, email, password_hash, first_name, last_name, phone, is_admin, is_active, created_at, last_login",
        )
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.phone)
        .bind(record.is_admin)
        .bind(record.is_active)
        .bind(record.created_at)
        .bind(record.last_login)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        user_from_row(&row)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, phone, is_admin, is_active, \
             created_at, last_login FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, phone, is_admin, is_active, \
             created_at, last_login FROM users WHERE id = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        active: bool,
    ) -> Result<Option<User>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let row = sqlx::query(
            "UPDATE users SET is_active = $1 WHERE id = $2 \
             RETURNING id, email, password_hash, first_name, last_name, phone, is_admin, is_active, \
             created_at, last_login",
        )
        .bind(active)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn touch_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(());
        };
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, phone, is_admin, is_active, \
             created_at, last_login FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(user_from_row).collect()
    }

    async fn find_or_create_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let existing = sqlx::query(
            "SELECT id, city, street, house_number FROM locations \
             WHERE city = $1 AND street = $2 AND house_number = $3",
        )
        .bind(&key.city)
        .bind(&key.street)
        .bind(&key.house_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if let Some(row) = existing {
            return location_from_row(&row);
        }

        let inserted = sqlx::query(
            "INSERT INTO locations (city, street, house_number) VALUES ($1, $2, $3) \
             ON CONFLICT (city, street, house_number) DO NOTHING \
             RETURNING id, city, street, house_number",
        )
        .bind(&key.city)
        .bind(&key.street)
        .bind(&key.house_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if let Some(row) = inserted {
            return location_from_row(&row);
        }

        let row = sqlx::query(
            "SELECT id, city, street, house_number FROM locations \
             WHERE city = $1 AND street = $2 AND house_number = $3",
        )
        .bind(&key.city)
        .bind(&key.street)
        .bind(&key.house_number)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        location_from_row(&row)
    }

    async fn insert_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let row = sqlx::query(
            "INSERT INTO locations (city, street, house_number) VALUES ($1, $2, $3) \
             RETURNING id, city, street, house_number",
        )
        .bind(&key.city)
        .bind(&key.street)
        .bind(&key.house_number)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        location_from_row(&row)
    }

    async fn location_by_id(&self, id: &LocationId) -> Result<Option<Location>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        self.location_row(key).await
    }

    async fn update_location(
        &self,
        id: &LocationId,
        key: &LocationKey,
    ) -> Result<Option<Location>, StoreError> {
        let Some(row_id) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let row = sqlx::query(
            "UPDATE locations SET city = $1, street = $2, house_number = $3 WHERE id = $4 \
             RETURNING id, city, street, house_number",
        )
        .bind(&key.city)
        .bind(&key.street)
        .bind(&key.house_number)
        .bind(row_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(location_from_row).transpose()
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let rows = sqlx::query("SELECT id, city, street, house_number FROM locations ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(location_from_row).collect()
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

        let row = sqlx::query(
            "INSERT INTO apartments \
             (title, description, price, owner_id, location_id, status, created_at, updated_at, \
              moderated_by, moderated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.price)
        .bind(owner_id)
        .bind(location_id)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(moderated_by)
        .bind(record.moderated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let id: i32 = get(&row, "id")?;
        self.fetch_apartment(id)
            .await?
            .ok_or_else(|| StoreError::query("inserted apartment vanished"))
    }

    async fn apartment_by_id(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        self.fetch_apartment(key).await
    }

    async fn update_apartment(
        &self,
        id: &ApartmentId,
        patch: &ApartmentPatch,
    ) -> Result<Option<Apartment>, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(None);
        };
        let current = sqlx::query("SELECT location_id FROM apartments WHERE id = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let Some(current) = current else {
            return Ok(None);
        };
        let current_location: Option<i32> = get(&current, "location_id")?;

        if let Some(new_key) = &patch.location {
            match current_location {
                Some(location_id) => {
                    sqlx::query(
                        "UPDATE locations SET city = $1, street = $2, house_number = $3 WHERE id = $4",
                    )
                    .bind(&new_key.city)
                    .bind(&new_key.street)
                    .bind(&new_key.house_number)
                    .bind(location_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
                }
                None => {
                    let location = self.find_or_create_location(new_key).await?;
                    let location_id = reference_key(location.id.as_str(), "location id")?;
                    sqlx::query("UPDATE apartments SET location_id = $1 WHERE id = $2")
                        .bind(location_id)
                        .bind(key)
                        .execute(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;
                }
            }
        }

        sqlx::query(
            "UPDATE apartments SET \
                 title = COALESCE($1, title), \
                 description = COALESCE($2, description), \
                 price = COALESCE($3, price), \
                 updated_at = now() \
             WHERE id = $4",
        )
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.price)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.fetch_apartment(key).await
    }

    async fn delete_apartment(&self, id: &ApartmentId) -> Result<bool, StoreError> {
        let Some(key) = lookup_key(id.as_str()) else {
            return Ok(false);
        };
        let outcome = sqlx::query("DELETE FROM apartments WHERE id = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn apartments_by_owner(&self, owner: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let Some(owner_key) = lookup_key(owner.as_str()) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments a \
             LEFT JOIN locations l ON a.location_id = l.id \
             WHERE a.owner_id = $1 ORDER BY a.id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_key)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(apartment_from_row).collect()
    }

    async fn list_apartments(&self, filter: &ListingFilter) -> Result<Vec<Apartment>, StoreError> {
        let visibility = if filter.viewer.is_admin() {
            ""
        } else {
            "WHERE a.status = 'approved' AND u.is_active"
        };
        let sql = format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments a \
             JOIN users u ON a.owner_id = u.id \
             LEFT JOIN locations l ON a.location_id = l.id \
             {visibility} ORDER BY a.id OFFSET $1 LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(filter.skip).unwrap_or(i64::MAX))
            .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(apartment_from_row).collect()
    }

    async fn pending_apartments(&self) -> Result<Vec<Apartment>, StoreError> {
        let sql = format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments a \
             LEFT JOIN locations l ON a.location_id = l.id \
             WHERE a.status = 'pending' ORDER BY a.id"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(apartment_from_row).collect()
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
        let outcome = sqlx::query(
            "UPDATE apartments SET status = $1, moderated_by = $2, moderated_at = $3 WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(moderator_key)
        .bind(at)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if outcome.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_apartment(key).await
    }

    async fn search_apartments(
        &self,
        query: &SearchQuery,
        viewer: &Viewer,
    ) -> Result<Vec<Apartment>, StoreError> {
        let text = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {APARTMENT_COLUMNS} FROM apartments a \
             JOIN users u ON a.owner_id = u.id \
             LEFT JOIN locations l ON a.location_id = l.id WHERE TRUE"
        ));

        if !viewer.is_admin() {
            builder.push(" AND a.status = 'approved' AND u.is_active");
        }
        if let Some(text) = text {
            builder
                .push(" AND a.search_vector @@ plainto_tsquery('english', ")
                .push_bind(text.to_owned())
                .push(")");
        }
        if let Some(min) = query.min_price {
            builder.push(" AND a.price >= ").push_bind(min);
        }
        if let Some(max) = query.max_price {
            builder.push(" AND a.price <= ").push_bind(max);
        }
        if let Some(city) = query.city.as_deref().filter(|city| !city.is_empty()) {
            builder.push(" AND l.city ILIKE ").push_bind(format!("%{city}%"));
        }

        match query.sort {
            Some(SearchSort::PriceAscending) => {
                builder.push(" ORDER BY a.price ASC");
            }
            Some(SearchSort::PriceDescending) => {
                builder.push(" ORDER BY a.price DESC");
            }
            Some(SearchSort::Newest) => {
                builder.push(" ORDER BY a.created_at DESC");
            }
            Some(SearchSort::Oldest) => {
                builder.push(" ORDER BY a.created_at ASC");
            }
            None => {
                if let Some(text) = text {
                    // Relevance ranking only makes sense with a query string.
                    builder
                        .push(" ORDER BY ts_rank_cd(a.search_vector, plainto_tsquery('english', ")
                        .push_bind(text.to_owned())
                        .push(")) DESC, a.created_at DESC");
                } else {
                    builder.push(" ORDER BY a.created_at DESC");
                }
            }
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(apartment_from_row).collect()
    }

    async fn observe(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let (Some(user_key), Some(apartment_key)) =
            (lookup_key(user.as_str()), lookup_key(apartment.as_str()))
        else {
            return Ok(false);
        };
        let outcome = sqlx::query(
            "INSERT INTO observations (user_id, apartment_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, apartment_id) DO NOTHING",
        )
        .bind(user_key)
        .bind(apartment_key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn unobserve(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let (Some(user_key), Some(apartment_key)) =
            (lookup_key(user.as_str()), lookup_key(apartment.as_str()))
        else {
            return Ok(false);
        };
        let outcome =
            sqlx::query("DELETE FROM observations WHERE user_id = $1 AND apartment_id = $2")
                .bind(user_key)
                .bind(apartment_key)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn observed_apartments(&self, user: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let Some(user_key) = lookup_key(user.as_str()) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {APARTMENT_COLUMNS} FROM observations o \
             JOIN apartments a ON o.apartment_id = a.id \
             LEFT JOIN locations l ON a.location_id = l.id \
             WHERE o.user_id = $1 ORDER BY o.id"
        );
        let rows = sqlx::query(&sql)
            .bind(user_key)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(apartment_from_row).collect()
    }

    async fn system_stats(&self) -> Result<SystemStats, StoreError> {
        let row = sqlx::query(
            "SELECT \
                 (SELECT COUNT(*) FROM users) AS total_users, \
                 (SELECT COUNT(*) FROM users WHERE is_active) AS active_users, \
                 COUNT(*) AS total_apartments, \
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending_apartments, \
                 COUNT(*) FILTER (WHERE status = 'approved') AS approved_apartments, \
                 COUNT(*) FILTER (WHERE status = 'rejected') AS rejected_apartments, \
                 COALESCE(AVG(price) FILTER (WHERE status = 'approved'), 0) AS average_price, \
                 COUNT(DISTINCT owner_id) AS total_owners \
             FROM apartments",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let count = |column: &str| -> Result<u64, StoreError> {
            let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
            Ok(value.unsigned_abs())
        };
        Ok(SystemStats {
            total_users: count("total_users")?,
            active_users: count("active_users")?,
            total_apartments: count("total_apartments")?,
            pending_apartments: count("pending_apartments")?,
            approved_apartments: count("approved_apartments")?,
            rejected_apartments: count("rejected_apartments")?,
            average_price: get(&row, "average_price")?,
            total_owners: count("total_owners")?,
        })
    }

    async fn city_distribution(&self) -> Result<Vec<CityStats>, StoreError> {
        let rows = sqlx::query(
            "SELECT l.city AS city, COUNT(*) AS count, AVG(a.price) AS avg_price \
             FROM apartments a JOIN locations l ON a.location_id = l.id \
             WHERE a.status = 'approved' \
             GROUP BY l.city ORDER BY count DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let count: i64 = get(row, "count")?;
                Ok(CityStats {
                    city: get(row, "city")?,
                    count: count.unsigned_abs(),
                    avg_price: get(row, "avg_price")?,
                })
            })
            .collect()
    }
}

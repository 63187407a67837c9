//! Row extraction helpers for the raw-SQL adapter.
//!
//! sqlx rows are mapped by hand here; listing queries always select the
//! apartment columns plus the left-joined location columns under fixed
//! aliases.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::warn;

use crate::domain::ports::StoreError;
use crate::domain::{
    Apartment, ApartmentId, ListingStatus, Location, LocationId, User, UserId,
};

/// Map sqlx failures to the store port error.
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) => {
            if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
                return StoreError::duplicate(
                    db.constraint().unwrap_or("unique constraint").to_owned(),
                );
            }
            StoreError::query(db.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::connection(error.to_string())
        }
        _ => StoreError::query(error.to_string()),
    }
}

/// Shorthand for `row.try_get` with error mapping.
pub(crate) fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(map_sqlx_error)
}

/// Columns every listing query must select.
pub(crate) const APARTMENT_COLUMNS: &str = "a.id, a.title, a.description, a.price, a.owner_id, \
     a.status, a.created_at, a.updated_at, a.moderated_by, a.moderated_at, \
     l.id AS loc_id, l.city AS loc_city, l.street AS loc_street, \
     l.house_number AS loc_house_number";

pub(crate) fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let id: i32 = get(row, "id")?;
    Ok(User {
        id: UserId::new(id.to_string()),
        email: get(row, "email")?,
        password_hash: get(row, "password_hash")?,
        first_name: get(row, "first_name")?,
        last_name: get(row, "last_name")?,
        phone: get(row, "phone")?,
        is_admin: get(row, "is_admin")?,
        is_active: get(row, "is_active")?,
        created_at: get(row, "created_at")?,
        last_login: get(row, "last_login")?,
    })
}

pub(crate) fn location_from_row(row: &PgRow) -> Result<Location, StoreError> {
    let id: i32 = get(row, "id")?;
    Ok(Location {
        id: LocationId::new(id.to_string()),
        city: get(row, "city")?,
        street: get(row, "street")?,
        house_number: get(row, "house_number")?,
    })
}

pub(crate) fn apartment_from_row(row: &PgRow) -> Result<Apartment, StoreError> {
    let id: i32 = get(row, "id")?;
    let owner_id: i32 = get(row, "owner_id")?;
    let moderated_by: Option<i32> = get(row, "moderated_by")?;
    let moderated_at: Option<DateTime<Utc>> = get(row, "moderated_at")?;
    let raw_status: String = get(row, "status")?;
    let status = ListingStatus::parse(&raw_status).unwrap_or_else(|| {
        warn!(value = %raw_status, apartment = id, "unrecognised status value, defaulting to pending");
        ListingStatus::Pending
    });

    let location = match get::<Option<i32>>(row, "loc_id")? {
        Some(loc_id) => Some(Location {
            id: LocationId::new(loc_id.to_string()),
            city: get(row, "loc_city")?,
            street: get(row, "loc_street")?,
            house_number: get(row, "loc_house_number")?,
        }),
        None => None,
    };

    Ok(Apartment {
        id: ApartmentId::new(id.to_string()),
        title: get(row, "title")?,
        description: get(row, "description")?,
        price: get(row, "price")?,
        owner_id: UserId::new(owner_id.to_string()),
        location,
        status,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        moderated_by: moderated_by.map(|id| UserId::new(id.to_string())),
        moderated_at,
    })
}

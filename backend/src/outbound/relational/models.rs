//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. They exist solely to satisfy Diesel's
//! type requirements for queries and mutations.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::warn;

use crate::domain::{
    Apartment, ApartmentId, ListingStatus, Location, LocationId, NewUser, User, UserId,
};

use super::schema::{apartments, locations, observations, users};

/// Row struct for reading from the users table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id.to_string()),
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            is_admin: row.is_admin,
            is_active: row.is_active,
            created_at: row.created_at,
            last_login: row.last_login,
        }
    }
}

/// Insertable struct for creating new account records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUserRow<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl<'a> NewUserRow<'a> {
    pub(crate) fn from_record(record: &'a NewUser) -> Self {
        Self {
            email: &record.email,
            password_hash: &record.password_hash,
            first_name: &record.first_name,
            last_name: &record.last_name,
            phone: &record.phone,
            is_admin: record.is_admin,
            is_active: record.is_active,
            created_at: record.created_at,
            last_login: record.last_login,
        }
    }
}

/// Changeset applied when an upsert finds an existing email.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = users)]
pub(crate) struct UserUpsertChanges<'a> {
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl<'a> UserUpsertChanges<'a> {
    pub(crate) fn from_record(record: &'a NewUser) -> Self {
        Self {
            password_hash: &record.password_hash,
            first_name: &record.first_name,
            last_name: &record.last_name,
            phone: &record.phone,
            is_admin: record.is_admin,
            is_active: record.is_active,
            created_at: record.created_at,
            last_login: record.last_login,
        }
    }
}

/// Row struct for reading from the locations table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LocationRow {
    pub id: i32,
    pub city: String,
    pub street: String,
    pub house_number: String,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            id: LocationId::new(row.id.to_string()),
            city: row.city,
            street: row.street,
            house_number: row.house_number,
        }
    }
}

/// Insertable struct for creating new address records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = locations)]
pub(crate) struct NewLocationRow<'a> {
    pub city: &'a str,
    pub street: &'a str,
    pub house_number: &'a str,
}

/// Row struct for reading from the apartments table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = apartments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ApartmentRow {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub owner_id: i32,
    #[expect(dead_code, reason = "location arrives via the join, not this id")]
    pub location_id: Option<i32>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub moderated_by: Option<i32>,
    pub moderated_at: Option<DateTime<Utc>>,
}

/// Assemble the domain view from an apartment row and its joined address.
pub(crate) fn apartment_from_rows(row: ApartmentRow, location: Option<LocationRow>) -> Apartment {
    let status = ListingStatus::parse(&row.status).unwrap_or_else(|| {
        warn!(value = %row.status, apartment = row.id, "unrecognised status value, defaulting to pending");
        ListingStatus::Pending
    });
    Apartment {
        id: ApartmentId::new(row.id.to_string()),
        title: row.title,
        description: row.description,
        price: row.price,
        owner_id: UserId::new(row.owner_id.to_string()),
        location: location.map(Location::from),
        status,
        created_at: row.created_at,
        updated_at: row.updated_at,
        moderated_by: row.moderated_by.map(|id| UserId::new(id.to_string())),
        moderated_at: row.moderated_at,
    }
}

/// Insertable struct for creating new listing records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = apartments)]
pub(crate) struct NewApartmentRow<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub price: f64,
    pub owner_id: i32,
    pub location_id: Option<i32>,
    pub status: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub moderated_by: Option<i32>,
    pub moderated_at: Option<DateTime<Utc>>,
}

/// Changeset struct for partial listing updates; `None` fields are skipped.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = apartments)]
pub(crate) struct ApartmentChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for bookmark records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = observations)]
pub(crate) struct NewObservationRow {
    pub user_id: i32,
    pub apartment_id: i32,
    pub created_at: DateTime<Utc>,
}

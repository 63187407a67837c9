//! BSON document shapes and their mapping to domain entities.
//!
//! The document variant embeds the address inside each listing and keeps
//! foreign references as hex strings. These structs are implementation
//! details of the adapter; nothing outside this module sees them.

use bson::DateTime as BsonDateTime;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::ports::StoreError;
use crate::domain::{
    Apartment, ApartmentId, ListingStatus, Location, LocationId, NewApartment, NewUser, User,
    UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UserDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub last_login: Option<BsonDateTime>,
}

impl UserDoc {
    pub(crate) fn from_record(record: &NewUser) -> Self {
        Self {
            id: None,
            email: record.email.clone(),
            password_hash: record.password_hash.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            phone: record.phone.clone(),
            is_admin: record.is_admin,
            is_active: record.is_active,
            created_at: BsonDateTime::from_chrono(record.created_at),
            last_login: record.last_login.map(BsonDateTime::from_chrono),
        }
    }

    pub(crate) fn into_user(self) -> Result<User, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::query("user document without _id"))?;
        Ok(User {
            id: UserId::new(id.to_hex()),
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            is_admin: self.is_admin,
            is_active: self.is_active,
            created_at: self.created_at.to_chrono(),
            last_login: self.last_login.map(BsonDateTime::to_chrono),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LocationDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub city: String,
    pub street: String,
    pub house_number: String,
}

impl LocationDoc {
    pub(crate) fn into_location(self) -> Result<Location, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::query("location document without _id"))?;
        Ok(Location {
            id: LocationId::new(id.to_hex()),
            city: self.city,
            street: self.street,
            house_number: self.house_number,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApartmentDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    pub price: f64,
    /// Hex string reference to the owning user document.
    pub owner_id: String,
    /// Embedded copy of the referenced location document.
    pub location: Option<LocationDoc>,
    pub status: String,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    pub moderated_by: Option<String>,
    pub moderated_at: Option<BsonDateTime>,
}

impl ApartmentDoc {
    pub(crate) fn from_record(record: &NewApartment, location: Option<LocationDoc>) -> Self {
        Self {
            id: None,
            title: record.title.clone(),
            description: record.description.clone(),
            price: record.price,
            owner_id: record.owner_id.to_string(),
            location,
            status: record.status.as_str().to_owned(),
            created_at: BsonDateTime::from_chrono(record.created_at),
            updated_at: BsonDateTime::from_chrono(record.updated_at),
            moderated_by: record.moderated_by.as_ref().map(ToString::to_string),
            moderated_at: record.moderated_at.map(BsonDateTime::from_chrono),
        }
    }

    pub(crate) fn into_apartment(self) -> Result<Apartment, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::query("apartment document without _id"))?;
        let status = ListingStatus::parse(&self.status).unwrap_or_else(|| {
            warn!(value = %self.status, apartment = %id, "unrecognised status value, defaulting to pending");
            ListingStatus::Pending
        });
        let location = match self.location {
            Some(doc) => Some(doc.into_location()?),
            None => None,
        };
        Ok(Apartment {
            id: ApartmentId::new(id.to_hex()),
            title: self.title,
            description: self.description,
            price: self.price,
            owner_id: UserId::new(self.owner_id),
            location,
            status,
            created_at: self.created_at.to_chrono(),
            updated_at: self.updated_at.to_chrono(),
            moderated_by: self.moderated_by.map(UserId::new),
            moderated_at: self.moderated_at.map(BsonDateTime::to_chrono),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ObservationDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Hex string reference to the observing user.
    pub user_id: String,
    /// Hex string reference to the observed apartment.
    pub apartment_id: String,
    pub created_at: BsonDateTime,
}

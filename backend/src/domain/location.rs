//! Physical address entity and its natural dedup key.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::LocationId;

/// The natural key identifying an address: exact (city, street,
/// house_number) match. Creation always looks for an existing row with the
/// same triple before inserting a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationKey {
    /// City name.
    pub city: String,
    /// Street name.
    pub street: String,
    /// House number, kept as text ("10", "10Б", "12/3").
    pub house_number: String,
}

impl LocationKey {
    /// Build a key from its parts.
    pub fn new(
        city: impl Into<String>,
        street: impl Into<String>,
        house_number: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            street: street.into(),
            house_number: house_number.into(),
        }
    }
}

/// A stored address. Referenced by listings, not owned by them; deleting a
/// listing leaves its location in place.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Store-assigned identifier.
    pub id: LocationId,
    /// City name.
    pub city: String,
    /// Street name.
    pub street: String,
    /// House number.
    pub house_number: String,
}

impl Location {
    /// The natural key of this address.
    pub fn key(&self) -> LocationKey {
        LocationKey::new(
            self.city.clone(),
            self.street.clone(),
            self.house_number.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[test]
    fn key_round_trips_through_location() {
        let location = Location {
            id: LocationId::new("7"),
            city: "Kyiv".into(),
            street: "Khreshchatyk".into(),
            house_number: "10".into(),
        };
        assert_eq!(location.key(), LocationKey::new("Kyiv", "Khreshchatyk", "10"));
    }
}

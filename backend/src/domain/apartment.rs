//! Listing entity, its moderation status machine, and mutation payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ApartmentId, Location, LocationId, LocationKey, UserId};

/// Moderation status of a listing.
///
/// New listings start `Pending` unless created by an administrator, in which
/// case they are `Approved` immediately. The only transitions are
/// `Pending -> Approved` and `Pending -> Rejected`, both performed by the
/// moderation operation; there is no un-approve or un-reject path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// Awaiting moderation; hidden from non-admin viewers.
    Pending,
    /// Publicly visible.
    Approved,
    /// Rejected by a moderator; hidden from non-admin viewers.
    Rejected,
}

impl ListingStatus {
    /// Initial status for a listing created by the given kind of actor.
    pub fn initial_for(creator_is_admin: bool) -> Self {
        if creator_is_admin {
            Self::Approved
        } else {
            Self::Pending
        }
    }

    /// Canonical lowercase name, as persisted by every adapter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the canonical lowercase name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether this status is a legal target for the moderation operation.
    pub fn is_moderation_target(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// A listing as stored and exposed to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Apartment {
    /// Store-assigned identifier.
    pub id: ApartmentId,
    /// Short headline.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Asking price.
    pub price: f64,
    /// Owning account.
    pub owner_id: UserId,
    /// Address; `None` when the referenced location row was deleted.
    pub location: Option<Location>,
    /// Moderation status.
    pub status: ListingStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Moderator who resolved the listing, set only by moderation.
    pub moderated_by: Option<UserId>,
    /// When the listing was moderated, set only by moderation.
    pub moderated_at: Option<DateTime<Utc>>,
}

/// Listing record ready for insertion; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApartment {
    /// Short headline.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Asking price.
    pub price: f64,
    /// Owning account.
    pub owner_id: UserId,
    /// Resolved address reference.
    pub location_id: Option<LocationId>,
    /// Initial (or migrated) status.
    pub status: ListingStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Carried over by migration; `None` for fresh listings.
    pub moderated_by: Option<UserId>,
    /// Carried over by migration; `None` for fresh listings.
    pub moderated_at: Option<DateTime<Utc>>,
}

impl NewApartment {
    /// Build the record for a freshly created listing.
    pub fn created(
        title: impl Into<String>,
        description: impl Into<String>,
        price: f64,
        owner_id: UserId,
        location_id: LocationId,
        status: ListingStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            description: description.into(),
            price,
            owner_id,
            location_id: Some(location_id),
            status,
            created_at: now,
            updated_at: now,
            moderated_by: None,
            moderated_at: None,
        }
    }
}

/// Partial update applied to an existing listing.
///
/// A supplied `location` updates the listing's current location row in
/// place; edits never mint a new address row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApartmentPatch {
    /// Replacement headline.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement price.
    pub price: Option<f64>,
    /// Replacement address fields for the existing location row.
    pub location: Option<LocationKey>,
}

impl ApartmentPatch {
    /// Whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.location.is_none()
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, ListingStatus::Pending)]
    #[case(true, ListingStatus::Approved)]
    fn initial_status_follows_creator_role(#[case] is_admin: bool, #[case] expected: ListingStatus) {
        assert_eq!(ListingStatus::initial_for(is_admin), expected);
    }

    #[rstest]
    #[case(ListingStatus::Pending, "pending")]
    #[case(ListingStatus::Approved, "approved")]
    #[case(ListingStatus::Rejected, "rejected")]
    fn status_names_round_trip(#[case] status: ListingStatus, #[case] name: &str) {
        assert_eq!(status.as_str(), name);
        assert_eq!(ListingStatus::parse(name), Some(status));
    }

    #[test]
    fn unknown_status_name_is_rejected() {
        assert_eq!(ListingStatus::parse("archived"), None);
    }

    #[rstest]
    #[case(ListingStatus::Pending, false)]
    #[case(ListingStatus::Approved, true)]
    #[case(ListingStatus::Rejected, true)]
    fn moderation_targets(#[case] status: ListingStatus, #[case] legal: bool) {
        assert_eq!(status.is_moderation_target(), legal);
    }

    #[test]
    fn empty_patch_reports_itself() {
        assert!(ApartmentPatch::default().is_empty());
        let patch = ApartmentPatch {
            price: Some(1200.0),
            ..ApartmentPatch::default()
        };
        assert!(!patch.is_empty());
    }
}

//! The storage-agnostic listing store port.
//!
//! One trait covers the whole capability set (accounts, addresses,
//! listings, observations, statistics) so the business services and the
//! migrator can run unchanged against any adapter. Adapters translate
//! between their native rows/documents and the domain entities and map
//! backend failures into [`StoreError`].
//!
//! Contract notes:
//! - "Not found" is expressed as `Ok(None)` / `Ok(false)`, never as an
//!   error; `StoreError` means the operation itself failed.
//! - Every operation acquires its connection inside the call and releases
//!   it on all exit paths.
//! - No operation validates business rules (moderation targets, ownership);
//!   those live in the services and the HTTP layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Apartment, ApartmentId, ApartmentPatch, CityStats, ListingStatus, Location, LocationId,
    LocationKey, NewApartment, NewUser, SystemStats, User, UserId,
};

use super::define_port_error;

define_port_error! {
    /// Failures raised by listing store adapters.
    pub enum StoreError {
        /// The backing store could not be reached.
        Connection { message: String } => "store connection failed: {message}",
        /// A query or mutation failed during execution.
        Query { message: String } => "store query failed: {message}",
        /// A unique constraint was violated.
        Duplicate { key: String } => "duplicate key: {key}",
    }
}

impl From<StoreError> for crate::domain::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection { message } => Self::service_unavailable(message),
            StoreError::Query { message } => Self::internal(message),
            StoreError::Duplicate { key } => Self::duplicate_key(format!("duplicate {key}")),
        }
    }
}

/// Who is looking at the catalogue; drives listing visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    /// Unauthenticated request.
    Public,
    /// A regular signed-in account.
    User(UserId),
    /// An administrator; sees every listing regardless of status.
    Admin,
}

impl Viewer {
    /// Whether this viewer bypasses the approved-and-active-owner filter.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Classify an optional authenticated user.
    pub fn for_user(user: Option<&User>) -> Self {
        match user {
            Some(user) if user.is_admin => Self::Admin,
            Some(user) => Self::User(user.id.clone()),
            None => Self::Public,
        }
    }
}

/// Catalogue listing filter.
///
/// Non-admin viewers only ever see approved listings owned by active
/// accounts; administrators see everything.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFilter {
    /// Who is asking.
    pub viewer: Viewer,
    /// Offset into the result set.
    pub skip: u64,
    /// Page size.
    pub limit: u64,
}

impl ListingFilter {
    /// Default page size for catalogue listings.
    pub const DEFAULT_LIMIT: u64 = 100;

    /// First page for the given viewer.
    pub fn for_viewer(viewer: Viewer) -> Self {
        Self {
            viewer,
            skip: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Adjust pagination.
    #[must_use]
    pub fn paged(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }
}

/// Sort orders accepted by the search operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    /// Cheapest first.
    PriceAscending,
    /// Most expensive first.
    PriceDescending,
    /// Most recently created first.
    Newest,
    /// Oldest first.
    Oldest,
}

impl SearchSort {
    /// Parse the query-string form used by the search endpoint.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "price_asc" => Some(Self::PriceAscending),
            "price_desc" => Some(Self::PriceDescending),
            "newest" => Some(Self::Newest),
            "oldest" => Some(Self::Oldest),
            _ => None,
        }
    }
}

/// Catalogue search parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Free-text query over title and description.
    pub text: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    pub max_price: Option<f64>,
    /// Case-insensitive city substring match.
    pub city: Option<String>,
    /// Requested ordering; adapters fall back to relevance/insertion order.
    pub sort: Option<SearchSort>,
}

/// Storage-agnostic persistence interface for the whole catalogue.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Create or patch the backing schema and (re)build indexes.
    ///
    /// Idempotent; called at startup and at the end of a migration run.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    // -- accounts ----------------------------------------------------------

    /// Insert a new account. Fails with [`StoreError::Duplicate`] when the
    /// email is already registered.
    async fn insert_user(&self, record: &NewUser) -> Result<User, StoreError>;

    /// Insert the account or, when the email already exists, overwrite that
    /// account's fields in place. Used by the dedup migration mode.
    async fn upsert_user_by_email(&self, record: &NewUser) -> Result<User, StoreError>;

    /// Look up an account by its unique email.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Look up an account by identifier.
    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Toggle the active flag; returns the updated account, or `None` when
    /// the id does not resolve.
    async fn set_user_active(&self, id: &UserId, active: bool)
    -> Result<Option<User>, StoreError>;

    /// Record a successful login at the given instant.
    async fn touch_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Every account, in insertion order.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    // -- locations ---------------------------------------------------------

    /// Return the address matching the exact (city, street, house_number)
    /// triple, inserting it first when absent.
    async fn find_or_create_location(&self, key: &LocationKey) -> Result<Location, StoreError>;

    /// Insert an address unconditionally. Used by the plain-copy migration
    /// mode; everything else goes through [`Self::find_or_create_location`].
    async fn insert_location(&self, key: &LocationKey) -> Result<Location, StoreError>;

    /// Look up an address by identifier.
    async fn location_by_id(&self, id: &LocationId) -> Result<Option<Location>, StoreError>;

    /// Rewrite an address row in place; returns `None` when the id does not
    /// resolve.
    async fn update_location(
        &self,
        id: &LocationId,
        key: &LocationKey,
    ) -> Result<Option<Location>, StoreError>;

    /// Every stored address.
    async fn list_locations(&self) -> Result<Vec<Location>, StoreError>;

    // -- listings ----------------------------------------------------------

    /// Insert a listing record.
    async fn insert_apartment(&self, record: &NewApartment) -> Result<Apartment, StoreError>;

    /// Look up a listing by identifier.
    async fn apartment_by_id(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError>;

    /// Apply a partial update; a supplied location key rewrites the
    /// listing's existing location row in place. Returns `None` when the id
    /// does not resolve.
    async fn update_apartment(
        &self,
        id: &ApartmentId,
        patch: &ApartmentPatch,
    ) -> Result<Option<Apartment>, StoreError>;

    /// Hard-delete a listing; `false` when the id did not resolve.
    async fn delete_apartment(&self, id: &ApartmentId) -> Result<bool, StoreError>;

    /// Every listing owned by the given account, any status.
    async fn apartments_by_owner(&self, owner: &UserId) -> Result<Vec<Apartment>, StoreError>;

    /// Catalogue page for the given viewer.
    async fn list_apartments(&self, filter: &ListingFilter) -> Result<Vec<Apartment>, StoreError>;

    /// Listings awaiting moderation.
    async fn pending_apartments(&self) -> Result<Vec<Apartment>, StoreError>;

    /// Set the status and stamp the moderator/time. Applies whatever status
    /// it is given; target validation happens at the HTTP boundary. Returns
    /// `None` when the id does not resolve.
    async fn moderate_apartment(
        &self,
        id: &ApartmentId,
        status: ListingStatus,
        moderator: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Apartment>, StoreError>;

    /// Search visible listings for the given viewer.
    async fn search_apartments(
        &self,
        query: &SearchQuery,
        viewer: &Viewer,
    ) -> Result<Vec<Apartment>, StoreError>;

    // -- observations ------------------------------------------------------

    /// Bookmark a listing for the user; `false` when the pair already
    /// existed. Unique per (user, apartment).
    async fn observe(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError>;

    /// Remove a bookmark; `false` when there was none.
    async fn unobserve(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError>;

    /// Listings the user has bookmarked.
    async fn observed_apartments(&self, user: &UserId) -> Result<Vec<Apartment>, StoreError>;

    // -- statistics --------------------------------------------------------

    /// System-wide counters and the approved-price average.
    async fn system_stats(&self) -> Result<SystemStats, StoreError>;

    /// Approved-listing distribution by city, most numerous first.
    async fn city_distribution(&self) -> Result<Vec<CityStats>, StoreError>;
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn sample_user(is_admin: bool) -> User {
        User {
            id: UserId::new("9"),
            email: "x@example.com".into(),
            password_hash: "$argon2id$x".into(),
            first_name: "X".into(),
            last_name: "Y".into(),
            phone: "1".into(),
            is_admin,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[rstest]
    fn viewer_classification_follows_admin_flag() {
        assert_eq!(Viewer::for_user(None), Viewer::Public);
        assert_eq!(Viewer::for_user(Some(&sample_user(true))), Viewer::Admin);
        assert_eq!(
            Viewer::for_user(Some(&sample_user(false))),
            Viewer::User(UserId::new("9"))
        );
    }

    #[rstest]
    #[case("price_asc", Some(SearchSort::PriceAscending))]
    #[case("price_desc", Some(SearchSort::PriceDescending))]
    #[case("newest", Some(SearchSort::Newest))]
    #[case("oldest", Some(SearchSort::Oldest))]
    #[case("shiniest", None)]
    fn sort_parsing(#[case] raw: &str, #[case] expected: Option<SearchSort>) {
        assert_eq!(SearchSort::parse(raw), expected);
    }

    #[rstest]
    fn filter_defaults_to_first_page() {
        let filter = ListingFilter::for_viewer(Viewer::Public);
        assert_eq!(filter.skip, 0);
        assert_eq!(filter.limit, ListingFilter::DEFAULT_LIMIT);
        let paged = filter.paged(40, 20);
        assert_eq!((paged.skip, paged.limit), (40, 20));
    }

    #[rstest]
    fn store_error_constructors_format_messages() {
        assert_eq!(
            StoreError::connection("refused").to_string(),
            "store connection failed: refused"
        );
        assert_eq!(
            StoreError::duplicate("users.email").to_string(),
            "duplicate key: users.email"
        );
    }
}

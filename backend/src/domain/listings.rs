//! Listing use-cases: creation, editing, moderation, search, bookmarks.
//!
//! Ownership checks deliberately do not live here: the HTTP layer decides
//! who may edit or delete a listing, the service only executes. The same
//! split applies to moderation-target validation.

use std::sync::Arc;

use chrono::Utc;

use super::ports::{ListingFilter, ListingStore, SearchQuery, Viewer};
use super::{
    Apartment, ApartmentId, ApartmentPatch, CityStats, Error, ListingStatus, LocationKey,
    NewApartment, SystemStats, User, UserId,
};

/// Payload for creating a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    /// Short headline.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Asking price.
    pub price: f64,
    /// Address; resolved against existing rows by exact triple match.
    pub location: LocationKey,
}

/// Business operations over the listing catalogue.
#[derive(Clone)]
pub struct ListingService {
    store: Arc<dyn ListingStore>,
}

impl ListingService {
    /// Create a service backed by the given store.
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Create a listing for `actor`. The address is deduplicated by its
    /// natural key; the initial status is `Approved` for administrators and
    /// `Pending` otherwise.
    pub async fn create(&self, actor: &User, draft: ListingDraft) -> Result<Apartment, Error> {
        if draft.title.trim().is_empty() {
            return Err(Error::invalid_request("title must not be empty"));
        }
        if !draft.price.is_finite() || draft.price < 0.0 {
            return Err(Error::invalid_request("price must be a non-negative number"));
        }

        let location = self.store.find_or_create_location(&draft.location).await?;
        let record = NewApartment::created(
            draft.title,
            draft.description,
            draft.price,
            actor.id.clone(),
            location.id,
            ListingStatus::initial_for(actor.is_admin),
        );
        self.store.insert_apartment(&record).await.map_err(Error::from)
    }

    /// Fetch one listing.
    pub async fn get(&self, id: &ApartmentId) -> Result<Apartment, Error> {
        self.store
            .apartment_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("no such listing"))
    }

    /// Apply a partial update. A supplied location rewrites the listing's
    /// existing address row in place rather than minting a new one.
    pub async fn update(
        &self,
        id: &ApartmentId,
        patch: &ApartmentPatch,
    ) -> Result<Apartment, Error> {
        if let Some(price) = patch.price
            && (!price.is_finite() || price < 0.0)
        {
            return Err(Error::invalid_request("price must be a non-negative number"));
        }
        self.store
            .update_apartment(id, patch)
            .await?
            .ok_or_else(|| Error::not_found("no such listing"))
    }

    /// Hard-delete a listing; `false` when the id did not resolve.
    pub async fn delete(&self, id: &ApartmentId) -> Result<bool, Error> {
        self.store.delete_apartment(id).await.map_err(Error::from)
    }

    /// Catalogue page for a viewer.
    pub async fn list(&self, filter: &ListingFilter) -> Result<Vec<Apartment>, Error> {
        self.store.list_apartments(filter).await.map_err(Error::from)
    }

    /// Every listing owned by the account, any status.
    pub async fn by_owner(&self, owner: &UserId) -> Result<Vec<Apartment>, Error> {
        self.store.apartments_by_owner(owner).await.map_err(Error::from)
    }

    /// Listings awaiting moderation, for the admin panel.
    pub async fn pending(&self) -> Result<Vec<Apartment>, Error> {
        self.store.pending_apartments().await.map_err(Error::from)
    }

    /// Resolve a pending listing. Stamps the moderator and the current
    /// time; applies whatever status the caller validated.
    pub async fn moderate(
        &self,
        id: &ApartmentId,
        status: ListingStatus,
        moderator: &User,
    ) -> Result<Apartment, Error> {
        self.store
            .moderate_apartment(id, status, &moderator.id, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found("no such listing"))
    }

    /// Search visible listings.
    pub async fn search(
        &self,
        query: &SearchQuery,
        viewer: &Viewer,
    ) -> Result<Vec<Apartment>, Error> {
        if let (Some(min), Some(max)) = (query.min_price, query.max_price)
            && min > max
        {
            return Err(Error::invalid_request("min_price exceeds max_price"));
        }
        self.store
            .search_apartments(query, viewer)
            .await
            .map_err(Error::from)
    }

    /// Bookmark a listing; idempotent per (user, apartment) pair.
    pub async fn observe(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, Error> {
        if self.store.apartment_by_id(apartment).await?.is_none() {
            return Err(Error::not_found("no such listing"));
        }
        self.store.observe(user, apartment).await.map_err(Error::from)
    }

    /// Drop a bookmark; `false` when there was none.
    pub async fn unobserve(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, Error> {
        self.store.unobserve(user, apartment).await.map_err(Error::from)
    }

    /// Listings the user has bookmarked.
    pub async fn observed(&self, user: &UserId) -> Result<Vec<Apartment>, Error> {
        self.store.observed_apartments(user).await.map_err(Error::from)
    }

    /// System-wide counters.
    pub async fn stats(&self) -> Result<SystemStats, Error> {
        self.store.system_stats().await.map_err(Error::from)
    }

    /// Approved-listing distribution by city.
    pub async fn city_distribution(&self) -> Result<Vec<CityStats>, Error> {
        self.store.city_distribution().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    //! Behaviour coverage against the in-memory store.
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::accounts::{AccountService, Registration};
    use crate::outbound::memory::MemoryStore;
    use rstest::rstest;

    struct Fixture {
        store: Arc<MemoryStore>,
        accounts: AccountService,
        listings: ListingService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            store: store.clone(),
            accounts: AccountService::new(store.clone()),
            listings: ListingService::new(store),
        }
    }

    async fn register(fx: &Fixture, email: &str) -> User {
        fx.accounts
            .register(Registration {
                email: email.into(),
                password: "hunter2".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                phone: "1234567890".into(),
            })
            .await
            .expect("registration succeeds")
    }

    async fn register_admin(fx: &Fixture, email: &str) -> User {
        let user = register(fx, email).await;
        fx.store.promote_to_admin(&user.id);
        fx.accounts
            .user_by_id(&user.id)
            .await
            .expect("lookup succeeds")
            .expect("user exists")
    }

    fn draft(title: &str) -> ListingDraft {
        ListingDraft {
            title: title.into(),
            description: "Sunny two-roomer".into(),
            price: 750.0,
            location: LocationKey::new("Kyiv", "Khreshchatyk", "10"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn non_admin_listings_start_pending_admin_listings_approved() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let admin = register_admin(&fx, "admin@example.com").await;

        let pending = fx
            .listings
            .create(&owner, draft("Plain flat"))
            .await
            .expect("create succeeds");
        assert_eq!(pending.status, ListingStatus::Pending);

        let approved = fx
            .listings
            .create(&admin, draft("Admin flat"))
            .await
            .expect("create succeeds");
        assert_eq!(approved.status, ListingStatus::Approved);
    }

    #[rstest]
    #[tokio::test]
    async fn moderation_stamps_moderator_and_time() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let admin = register_admin(&fx, "admin@example.com").await;
        let listing = fx
            .listings
            .create(&owner, draft("Plain flat"))
            .await
            .expect("create succeeds");

        let moderated = fx
            .listings
            .moderate(&listing.id, ListingStatus::Approved, &admin)
            .await
            .expect("moderation succeeds");
        assert_eq!(moderated.status, ListingStatus::Approved);
        assert_eq!(moderated.moderated_by.as_ref(), Some(&admin.id));
        assert!(moderated.moderated_at.is_some());

        // Re-applying the same status is not guarded at this level.
        let again = fx
            .listings
            .moderate(&listing.id, ListingStatus::Approved, &admin)
            .await
            .expect("re-moderation succeeds");
        assert_eq!(again.status, ListingStatus::Approved);
    }

    #[rstest]
    #[tokio::test]
    async fn public_viewers_only_see_approved_listings() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let admin = register_admin(&fx, "admin@example.com").await;
        let listing = fx
            .listings
            .create(&owner, draft("Plain flat"))
            .await
            .expect("create succeeds");

        let public = ListingFilter::for_viewer(Viewer::Public);
        assert!(fx.listings.list(&public).await.expect("list").is_empty());

        fx.listings
            .moderate(&listing.id, ListingStatus::Approved, &admin)
            .await
            .expect("moderation succeeds");
        let visible = fx.listings.list(&public).await.expect("list");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, listing.id);
    }

    #[rstest]
    #[tokio::test]
    async fn deactivated_owners_disappear_from_public_views() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let admin = register_admin(&fx, "admin@example.com").await;
        let listing = fx
            .listings
            .create(&owner, draft("Plain flat"))
            .await
            .expect("create succeeds");
        fx.listings
            .moderate(&listing.id, ListingStatus::Approved, &admin)
            .await
            .expect("moderation succeeds");

        fx.accounts
            .toggle_active(&owner.id)
            .await
            .expect("toggle succeeds");

        let public = ListingFilter::for_viewer(Viewer::Public);
        assert!(fx.listings.list(&public).await.expect("list").is_empty());

        let as_admin = ListingFilter::for_viewer(Viewer::Admin);
        assert_eq!(fx.listings.list(&as_admin).await.expect("list").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn repeated_location_creates_reuse_the_same_row() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let first = fx
            .listings
            .create(&owner, draft("First"))
            .await
            .expect("create succeeds");
        let second = fx
            .listings
            .create(&owner, draft("Second"))
            .await
            .expect("create succeeds");
        assert_eq!(
            first.location.expect("has location").id,
            second.location.expect("has location").id
        );
    }

    #[rstest]
    #[tokio::test]
    async fn update_rewrites_location_in_place() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let listing = fx
            .listings
            .create(&owner, draft("Plain flat"))
            .await
            .expect("create succeeds");
        let location_id = listing.location.clone().expect("has location").id;

        let patch = ApartmentPatch {
            title: Some("Renamed".into()),
            location: Some(LocationKey::new("Kyiv", "Velyka Vasylkivska", "5")),
            ..ApartmentPatch::default()
        };
        let updated = fx
            .listings
            .update(&listing.id, &patch)
            .await
            .expect("update succeeds");
        let updated_location = updated.location.expect("has location");
        assert_eq!(updated_location.id, location_id);
        assert_eq!(updated_location.street, "Velyka Vasylkivska");
        assert_eq!(updated.title, "Renamed");
        assert!(updated.updated_at >= listing.updated_at);
    }

    #[rstest]
    #[tokio::test]
    async fn bookmarks_are_unique_per_pair_and_require_the_listing() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let fan = register(&fx, "fan@example.com").await;
        let listing = fx
            .listings
            .create(&owner, draft("Plain flat"))
            .await
            .expect("create succeeds");

        assert!(fx
            .listings
            .observe(&fan.id, &listing.id)
            .await
            .expect("observe succeeds"));
        assert!(!fx
            .listings
            .observe(&fan.id, &listing.id)
            .await
            .expect("second observe is a no-op"));
        assert_eq!(fx.listings.observed(&fan.id).await.expect("list").len(), 1);

        let err = fx
            .listings
            .observe(&fan.id, &ApartmentId::new("999"))
            .await
            .expect_err("missing listing");
        assert_eq!(err.code(), ErrorCode::NotFound);

        assert!(fx
            .listings
            .unobserve(&fan.id, &listing.id)
            .await
            .expect("unobserve succeeds"));
        assert!(!fx
            .listings
            .unobserve(&fan.id, &listing.id)
            .await
            .expect("second unobserve is a no-op"));
    }

    #[rstest]
    #[tokio::test]
    async fn stats_count_users_listings_and_average_price() {
        let fx = fixture();
        let owner = register(&fx, "owner@example.com").await;
        let admin = register_admin(&fx, "admin@example.com").await;
        fx.listings
            .create(&admin, ListingDraft { price: 1000.0, ..draft("A") })
            .await
            .expect("create succeeds");
        fx.listings
            .create(&admin, ListingDraft { price: 2000.0, ..draft("B") })
            .await
            .expect("create succeeds");
        fx.listings
            .create(&owner, draft("Pending one"))
            .await
            .expect("create succeeds");

        let stats = fx.listings.stats().await.expect("stats");
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.total_apartments, 3);
        assert_eq!(stats.pending_apartments, 1);
        assert_eq!(stats.approved_apartments, 2);
        assert_eq!(stats.rejected_apartments, 0);
        assert!((stats.average_price - 1500.0).abs() < f64::EPSILON);
        assert_eq!(stats.total_owners, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn search_filters_by_price_and_city() {
        let fx = fixture();
        let admin = register_admin(&fx, "admin@example.com").await;
        fx.listings
            .create(
                &admin,
                ListingDraft {
                    title: "Central flat".into(),
                    description: "By the river".into(),
                    price: 900.0,
                    location: LocationKey::new("Kyiv", "Khreshchatyk", "10"),
                },
            )
            .await
            .expect("create succeeds");
        fx.listings
            .create(
                &admin,
                ListingDraft {
                    title: "Seaside studio".into(),
                    description: "Old town".into(),
                    price: 400.0,
                    location: LocationKey::new("Odesa", "Derybasivska", "3"),
                },
            )
            .await
            .expect("create succeeds");

        let query = SearchQuery {
            min_price: Some(500.0),
            ..SearchQuery::default()
        };
        let hits = fx
            .listings
            .search(&query, &Viewer::Public)
            .await
            .expect("search succeeds");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Central flat");

        let by_city = SearchQuery {
            city: Some("ode".into()),
            ..SearchQuery::default()
        };
        let hits = fx
            .listings
            .search(&by_city, &Viewer::Public)
            .await
            .expect("search succeeds");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Seaside studio");

        let inverted = SearchQuery {
            min_price: Some(10.0),
            max_price: Some(1.0),
            ..SearchQuery::default()
        };
        let err = fx
            .listings
            .search(&inverted, &Viewer::Public)
            .await
            .expect_err("inverted bounds");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}

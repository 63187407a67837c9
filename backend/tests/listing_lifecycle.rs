//! End-to-end service behaviour over the in-memory store.
//!
//! Exercises the full listing lifecycle the way the HTTP layer drives it:
//! register, create, moderate, list, bookmark.

use std::sync::Arc;

use domivka::domain::accounts::{AccountService, Registration};
use domivka::domain::auth::LoginCredentials;
use domivka::domain::listings::{ListingDraft, ListingService};
use domivka::domain::ports::{ListingFilter, SearchQuery, SearchSort, Viewer};
use domivka::domain::{ErrorCode, ListingStatus, LocationKey, User};
use domivka::outbound::memory::MemoryStore;
use rstest::rstest;

struct World {
    store: Arc<MemoryStore>,
    accounts: AccountService,
    listings: ListingService,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    World {
        store: store.clone(),
        accounts: AccountService::new(store.clone()),
        listings: ListingService::new(store),
    }
}

async fn register(world: &World, email: &str) -> User {
    world
        .accounts
        .register(Registration {
            email: email.into(),
            password: "hunter2".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            phone: "0971112233".into(),
        })
        .await
        .expect("registration succeeds")
}

async fn register_admin(world: &World, email: &str) -> User {
    let user = register(world, email).await;
    world.store.promote_to_admin(&user.id);
    world
        .accounts
        .user_by_id(&user.id)
        .await
        .expect("lookup succeeds")
        .expect("user exists")
}

fn kyiv_draft(title: &str, price: f64) -> ListingDraft {
    ListingDraft {
        title: title.into(),
        description: "Bright, renovated, near the metro".into(),
        price,
        location: LocationKey::new("Kyiv", "Khreshchatyk", "10"),
    }
}

#[rstest]
#[tokio::test]
async fn listing_lifecycle_from_registration_to_public_visibility() {
    let world = world();

    // Register U1 (non-admin) and create A1 as U1.
    let owner = register(&world, "u1@example.com").await;
    let listing = world
        .listings
        .create(&owner, kyiv_draft("Two-room flat", 850.0))
        .await
        .expect("create succeeds");
    assert_eq!(listing.status, ListingStatus::Pending);

    // Anonymous catalogue is empty while the listing is pending.
    let public = ListingFilter::for_viewer(Viewer::Public);
    assert!(world.listings.list(&public).await.expect("list").is_empty());

    // Admin moderates A1 to approved.
    let admin = register_admin(&world, "admin@example.com").await;
    let moderated = world
        .listings
        .moderate(&listing.id, ListingStatus::Approved, &admin)
        .await
        .expect("moderation succeeds");
    assert_eq!(moderated.status, ListingStatus::Approved);
    assert_eq!(moderated.moderated_by.as_ref(), Some(&admin.id));
    assert!(moderated.moderated_at.is_some());

    // Anonymous catalogue now returns exactly [A1].
    let visible = world.listings.list(&public).await.expect("list");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, listing.id);
}

#[rstest]
#[tokio::test]
async fn duplicate_registration_and_login_round_trip() {
    let world = world();
    register(&world, "u1@example.com").await;

    let err = world
        .accounts
        .register(Registration {
            email: "u1@example.com".into(),
            password: "other".into(),
            first_name: "Other".into(),
            last_name: "Person".into(),
            phone: "0970000000".into(),
        })
        .await
        .expect_err("second registration fails");
    assert_eq!(err.code(), ErrorCode::DuplicateKey);

    let creds =
        LoginCredentials::try_from_parts("u1@example.com", "hunter2").expect("valid credentials");
    let user = world.accounts.login(&creds).await.expect("login succeeds");
    assert!(user.last_login.is_some());
}

#[rstest]
#[tokio::test]
async fn admin_created_listings_skip_moderation() {
    let world = world();
    let admin = register_admin(&world, "admin@example.com").await;
    let listing = world
        .listings
        .create(&admin, kyiv_draft("Penthouse", 2500.0))
        .await
        .expect("create succeeds");
    assert_eq!(listing.status, ListingStatus::Approved);

    let public = ListingFilter::for_viewer(Viewer::Public);
    assert_eq!(world.listings.list(&public).await.expect("list").len(), 1);
}

#[rstest]
#[tokio::test]
async fn search_supports_text_price_city_and_sort() {
    let world = world();
    let admin = register_admin(&world, "admin@example.com").await;
    world
        .listings
        .create(&admin, kyiv_draft("Quiet two-roomer", 850.0))
        .await
        .expect("create succeeds");
    world
        .listings
        .create(
            &admin,
            ListingDraft {
                title: "Seaside studio".into(),
                description: "Steps from the beach".into(),
                price: 430.0,
                location: LocationKey::new("Odesa", "Derybasivska", "3"),
            },
        )
        .await
        .expect("create succeeds");

    let text_hits = world
        .listings
        .search(
            &SearchQuery {
                text: Some("beach".into()),
                ..SearchQuery::default()
            },
            &Viewer::Public,
        )
        .await
        .expect("search succeeds");
    assert_eq!(text_hits.len(), 1);
    assert_eq!(text_hits[0].title, "Seaside studio");

    let sorted = world
        .listings
        .search(
            &SearchQuery {
                sort: Some(SearchSort::PriceDescending),
                ..SearchQuery::default()
            },
            &Viewer::Public,
        )
        .await
        .expect("search succeeds");
    assert_eq!(sorted.len(), 2);
    assert!(sorted[0].price >= sorted[1].price);

    let kyiv_only = world
        .listings
        .search(
            &SearchQuery {
                city: Some("kyiv".into()),
                ..SearchQuery::default()
            },
            &Viewer::Public,
        )
        .await
        .expect("search succeeds");
    assert_eq!(kyiv_only.len(), 1);
    assert_eq!(kyiv_only[0].title, "Quiet two-roomer");
}

#[rstest]
#[tokio::test]
async fn pending_and_rejected_listings_stay_hidden_from_search() {
    let world = world();
    let owner = register(&world, "owner@example.com").await;
    let admin = register_admin(&world, "admin@example.com").await;

    let first = world
        .listings
        .create(&owner, kyiv_draft("Pending flat", 500.0))
        .await
        .expect("create succeeds");
    let second = world
        .listings
        .create(&owner, kyiv_draft("Rejected flat", 600.0))
        .await
        .expect("create succeeds");
    world
        .listings
        .moderate(&second.id, ListingStatus::Rejected, &admin)
        .await
        .expect("moderation succeeds");

    let hits = world
        .listings
        .search(&SearchQuery::default(), &Viewer::Public)
        .await
        .expect("search succeeds");
    assert!(hits.is_empty());

    // Admin search still sees both.
    let admin_hits = world
        .listings
        .search(&SearchQuery::default(), &Viewer::Admin)
        .await
        .expect("search succeeds");
    assert_eq!(admin_hits.len(), 2);
    assert!(admin_hits.iter().any(|hit| hit.id == first.id));
}

#[rstest]
#[tokio::test]
async fn deleting_a_listing_clears_its_bookmarks() {
    let world = world();
    let owner = register(&world, "owner@example.com").await;
    let fan = register(&world, "fan@example.com").await;
    let listing = world
        .listings
        .create(&owner, kyiv_draft("Watched flat", 700.0))
        .await
        .expect("create succeeds");

    assert!(world
        .listings
        .observe(&fan.id, &listing.id)
        .await
        .expect("observe succeeds"));
    assert_eq!(world.listings.observed(&fan.id).await.expect("list").len(), 1);

    assert!(world.listings.delete(&listing.id).await.expect("delete succeeds"));
    assert!(world
        .listings
        .observed(&fan.id)
        .await
        .expect("list")
        .is_empty());
}

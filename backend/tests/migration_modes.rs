//! Migration behaviour between two stores, including the plain-copy vs
//! dedup-upsert divergence on repeated runs.

use std::sync::Arc;

use domivka::domain::accounts::{AccountService, Registration};
use domivka::domain::listings::{ListingDraft, ListingService};
use domivka::domain::ports::{ListingFilter, ListingStore, Viewer};
use domivka::domain::{ListingStatus, LocationKey};
use domivka::migration::{CopyMode, Migrator};
use domivka::outbound::memory::MemoryStore;
use rstest::rstest;

/// Seed a source store with two accounts (one admin), two addresses, and
/// three listings in assorted statuses.
async fn seeded_source() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let accounts = AccountService::new(store.clone());
    let listings = ListingService::new(store.clone());

    let owner = accounts
        .register(Registration {
            email: "owner@example.com".into(),
            password: "hunter2".into(),
            first_name: "Olena".into(),
            last_name: "Shevchenko".into(),
            phone: "0971112233".into(),
        })
        .await
        .expect("registration succeeds");
    let admin = accounts
        .register(Registration {
            email: "admin@example.com".into(),
            password: "hunter2".into(),
            first_name: "Admin".into(),
            last_name: "User".into(),
            phone: "0974445566".into(),
        })
        .await
        .expect("registration succeeds");
    store.promote_to_admin(&admin.id);
    let admin = accounts
        .user_by_id(&admin.id)
        .await
        .expect("lookup succeeds")
        .expect("admin exists");

    let pending = listings
        .create(
            &owner,
            ListingDraft {
                title: "Pending flat".into(),
                description: "Needs review".into(),
                price: 500.0,
                location: LocationKey::new("Kyiv", "Khreshchatyk", "10"),
            },
        )
        .await
        .expect("create succeeds");
    listings
        .create(
            &owner,
            ListingDraft {
                title: "Second flat".into(),
                description: "Same building".into(),
                price: 640.0,
                location: LocationKey::new("Kyiv", "Khreshchatyk", "10"),
            },
        )
        .await
        .expect("create succeeds");
    listings
        .create(
            &admin,
            ListingDraft {
                title: "Lviv loft".into(),
                description: "Old town".into(),
                price: 900.0,
                location: LocationKey::new("Lviv", "Rynok", "1"),
            },
        )
        .await
        .expect("create succeeds");
    listings
        .moderate(&pending.id, ListingStatus::Approved, &admin)
        .await
        .expect("moderation succeeds");

    store
}

#[rstest]
#[tokio::test]
async fn migration_preserves_records_and_references() {
    let source = seeded_source().await;
    let dest = Arc::new(MemoryStore::new());

    let mut migrator = Migrator::new(source.clone(), dest.clone(), CopyMode::Upsert);
    assert!(migrator.run().await);

    let users = dest.list_users().await.expect("list users");
    assert_eq!(users.len(), 2);
    let owner = users
        .iter()
        .find(|user| user.email == "owner@example.com")
        .expect("owner migrated");
    // Hashes travel verbatim; they are opaque strings to the migrator.
    assert!(owner.password_hash.starts_with("$argon2id$"));

    assert_eq!(dest.list_locations().await.expect("list").len(), 2);

    let all = dest
        .list_apartments(&ListingFilter {
            viewer: Viewer::Admin,
            skip: 0,
            limit: u64::MAX,
        })
        .await
        .expect("list apartments");
    assert_eq!(all.len(), 3);

    // References were rewritten to destination ids: every owner resolves.
    for apartment in &all {
        assert!(
            dest.user_by_id(&apartment.owner_id)
                .await
                .expect("lookup succeeds")
                .is_some(),
            "owner reference must resolve in the destination"
        );
    }

    // The moderated listing kept its status and moderator stamp.
    let approved = all
        .iter()
        .filter(|apartment| apartment.status == ListingStatus::Approved)
        .count();
    assert_eq!(approved, 2);
    assert!(all.iter().any(|apartment| apartment.moderated_by.is_some()));
}

#[rstest]
#[tokio::test]
async fn rerunning_upsert_mode_is_idempotent() {
    let source = seeded_source().await;
    let dest = Arc::new(MemoryStore::new());

    let mut first = Migrator::new(source.clone(), dest.clone(), CopyMode::Upsert);
    assert!(first.run().await);
    let mut second = Migrator::new(source.clone(), dest.clone(), CopyMode::Upsert);
    assert!(second.run().await);

    // No duplicate address rows for the same (city, street, house_number).
    assert_eq!(dest.list_locations().await.expect("list").len(), 2);
    assert_eq!(dest.list_users().await.expect("list").len(), 2);
}

#[rstest]
#[tokio::test]
async fn rerunning_plain_mode_duplicates_addresses() {
    let source = seeded_source().await;
    let dest = Arc::new(MemoryStore::new());

    let mut first = Migrator::new(source.clone(), dest.clone(), CopyMode::Plain);
    assert!(first.run().await);
    let mut second = Migrator::new(source.clone(), dest.clone(), CopyMode::Plain);
    assert!(second.run().await);

    // Plain copy inserts unconditionally: the address rows double up.
    assert_eq!(dest.list_locations().await.expect("list").len(), 4);
}

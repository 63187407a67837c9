//! Cross-store data migration.
//!
//! Copies accounts, then addresses, then listings, in that dependency
//! order, from one store into another, rewriting references through an
//! in-memory id-remapping table built as each record lands. Runs
//! single-threaded and standalone; it is not safe against concurrent
//! writers on the destination, and it is not transactional across entities:
//! a failure while copying listings leaves accounts and addresses already
//! committed.
//!
//! [`Migrator::run`] never propagates errors; every failure is logged and
//! folded into a `false` return.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::ports::{ListingStore, StoreError};
use crate::domain::{Apartment, NewApartment, UserId};

/// How records are written into the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Insert unconditionally. Re-running duplicates address rows on
    /// backends without a natural-key constraint.
    Plain,
    /// Upsert by natural key (account email, address triple); re-running is
    /// idempotent.
    Upsert,
}

/// Source-id to destination-id mapping per entity.
#[derive(Debug, Default)]
struct IdMap {
    users: HashMap<String, String>,
    locations: HashMap<String, String>,
}

/// One-shot copier between two listing stores.
pub struct Migrator {
    source: Arc<dyn ListingStore>,
    dest: Arc<dyn ListingStore>,
    mode: CopyMode,
    ids: IdMap,
}

impl Migrator {
    /// Prepare a migration from `source` into `dest`.
    pub fn new(source: Arc<dyn ListingStore>, dest: Arc<dyn ListingStore>, mode: CopyMode) -> Self {
        Self {
            source,
            dest,
            mode,
            ids: IdMap::default(),
        }
    }

    /// Run the whole migration: users, locations, apartments, then a final
    /// index rebuild on the destination. Returns `true` on full success;
    /// all failures are logged and converted to `false`.
    pub async fn run(&mut self) -> bool {
        info!(mode = ?self.mode, "starting store migration");
        let outcome = self.run_inner().await;
        match outcome {
            Ok(()) => {
                info!("migration completed");
                true
            }
            Err(err) => {
                error!(error = %err, "migration failed");
                false
            }
        }
    }

    async fn run_inner(&mut self) -> Result<(), StoreError> {
        let users = self.migrate_users().await?;
        info!(count = users, "migrated users");
        let locations = self.migrate_locations().await?;
        info!(count = locations, "migrated locations");
        let (apartments, skipped) = self.migrate_apartments().await?;
        info!(count = apartments, skipped, "migrated apartments");
        // Rebuild destination indexes after the bulk load.
        self.dest.ensure_schema().await?;
        Ok(())
    }

    async fn migrate_users(&mut self) -> Result<usize, StoreError> {
        let users = self.source.list_users().await?;
        let mut copied = 0;
        for user in users {
            let record = user.to_record();
            let migrated = match self.mode {
                CopyMode::Upsert => self.dest.upsert_user_by_email(&record).await?,
                CopyMode::Plain => match self.dest.insert_user(&record).await {
                    Ok(migrated) => migrated,
                    Err(StoreError::Duplicate { .. }) => {
                        // The destination already has this email; map onto the
                        // existing account so listings still resolve.
                        warn!(email = %record.email, "email already present in destination");
                        self.dest
                            .user_by_email(&record.email)
                            .await?
                            .ok_or_else(|| StoreError::query("duplicate user vanished"))?
                    }
                    Err(err) => return Err(err),
                },
            };
            self.ids
                .users
                .insert(user.id.to_string(), migrated.id.to_string());
            copied += 1;
        }
        Ok(copied)
    }

    async fn migrate_locations(&mut self) -> Result<usize, StoreError> {
        let locations = self.source.list_locations().await?;
        let mut copied = 0;
        for location in locations {
            let key = location.key();
            let migrated = match self.mode {
                CopyMode::Upsert => self.dest.find_or_create_location(&key).await?,
                CopyMode::Plain => match self.dest.insert_location(&key).await {
                    Ok(migrated) => migrated,
                    Err(StoreError::Duplicate { .. }) => {
                        warn!(
                            city = %key.city,
                            street = %key.street,
                            "destination enforces the natural key; reusing existing address"
                        );
                        self.dest.find_or_create_location(&key).await?
                    }
                    Err(err) => return Err(err),
                },
            };
            self.ids
                .locations
                .insert(location.id.to_string(), migrated.id.to_string());
            copied += 1;
        }
        Ok(copied)
    }

    async fn migrate_apartments(&mut self) -> Result<(usize, usize), StoreError> {
        let apartments = self
            .source
            .list_apartments(&crate::domain::ports::ListingFilter {
                viewer: crate::domain::ports::Viewer::Admin,
                skip: 0,
                limit: u64::MAX,
            })
            .await?;

        let mut copied = 0;
        let mut skipped = 0;
        for apartment in apartments {
            if self.copy_apartment(&apartment).await? {
                copied += 1;
            } else {
                skipped += 1;
            }
        }
        Ok((copied, skipped))
    }

    /// Copy one listing; `false` means it was skipped because its owner
    /// could not be resolved in the destination.
    async fn copy_apartment(&mut self, apartment: &Apartment) -> Result<bool, StoreError> {
        let Some(owner_id) = self.ids.users.get(apartment.owner_id.as_str()).cloned() else {
            warn!(apartment = %apartment.id, owner = %apartment.owner_id, "owner not in id map, skipping listing");
            return Ok(false);
        };

        let location_id = match &apartment.location {
            Some(location) => {
                let mapped = self.ids.locations.get(location.id.as_str()).cloned();
                match mapped {
                    Some(id) => Some(id),
                    None => {
                        // The referenced address was missed by the bulk copy;
                        // resolve it just in time.
                        warn!(location = %location.id, "address missing from id map, inserting just in time");
                        let created = self.dest.find_or_create_location(&location.key()).await?;
                        self.ids
                            .locations
                            .insert(location.id.to_string(), created.id.to_string());
                        Some(created.id.to_string())
                    }
                }
            }
            None => None,
        };

        let moderated_by = apartment
            .moderated_by
            .as_ref()
            .and_then(|id| self.ids.users.get(id.as_str()).cloned())
            .map(UserId::new);

        let record = NewApartment {
            title: apartment.title.clone(),
            description: apartment.description.clone(),
            price: apartment.price,
            owner_id: UserId::new(owner_id),
            location_id: location_id.map(crate::domain::LocationId::new),
            status: apartment.status,
            created_at: apartment.created_at,
            updated_at: apartment.updated_at,
            moderated_by,
            moderated_at: apartment.moderated_at,
        };
        self.dest.insert_apartment(&record).await?;
        Ok(true)
    }
}

//! In-memory listing store.
//!
//! A complete, deterministic implementation of the store port used by unit
//! and integration tests, and as a rehearsal target for the migrator. It
//! mirrors the relational layout (locations referenced by id, joined at
//! read time) so visibility and dedup behaviour match the real adapters.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{ListingFilter, ListingStore, SearchQuery, SearchSort, StoreError, Viewer};
use crate::domain::{
    Apartment, ApartmentId, ApartmentPatch, CityStats, ListingStatus, Location, LocationId,
    LocationKey, NewApartment, NewUser, SystemStats, User, UserId,
};

/// Row as stored: the location is referenced, not embedded.
#[derive(Debug, Clone)]
struct ApartmentRow {
    id: i64,
    title: String,
    description: String,
    price: f64,
    owner_id: i64,
    location_id: Option<i64>,
    status: ListingStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    moderated_by: Option<i64>,
    moderated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
    locations: BTreeMap<i64, Location>,
    apartments: BTreeMap<i64, ApartmentRow>,
    observations: BTreeSet<(i64, i64)>,
}

impl Inner {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn apartment_view(&self, row: &ApartmentRow) -> Apartment {
        Apartment {
            id: ApartmentId::new(row.id.to_string()),
            title: row.title.clone(),
            description: row.description.clone(),
            price: row.price,
            owner_id: UserId::new(row.owner_id.to_string()),
            location: row
                .location_id
                .and_then(|id| self.locations.get(&id))
                .cloned(),
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            moderated_by: row.moderated_by.map(|id| UserId::new(id.to_string())),
            moderated_at: row.moderated_at,
        }
    }

    fn owner_is_active(&self, owner_id: i64) -> bool {
        self.users.get(&owner_id).is_some_and(|user| user.is_active)
    }

    fn visible_to(&self, row: &ApartmentRow, viewer: &Viewer) -> bool {
        viewer.is_admin()
            || (row.status == ListingStatus::Approved && self.owner_is_active(row.owner_id))
    }
}

/// Deterministic in-memory implementation of [`ListingStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutex poisoning only happens after a panic in another test thread;
        // recovering the data is still the right move for a test double.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Grant the admin flag to an existing account. Test seam: registration
    /// never creates administrators.
    pub fn promote_to_admin(&self, id: &UserId) {
        let mut inner = self.lock();
        if let Some(key) = parse_id(id.as_str())
            && let Some(user) = inner.users.get_mut(&key)
        {
            user.is_admin = true;
        }
    }
}

fn user_from_record(id: i64, record: &NewUser) -> User {
    User {
        id: UserId::new(id.to_string()),
        email: record.email.clone(),
        password_hash: record.password_hash.clone(),
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
        phone: record.phone.clone(),
        is_admin: record.is_admin,
        is_active: record.is_active,
        created_at: record.created_at,
        last_login: record.last_login,
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_user(&self, record: &NewUser) -> Result<User, StoreError> {
        let mut inner = self.lock();
        if inner.users.values().any(|user| user.email == record.email) {
            return Err(StoreError::duplicate("users.email"));
        }
        let id = inner.assign_id();
        let user = user_from_record(id, record);
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn upsert_user_by_email(&self, record: &NewUser) -> Result<User, StoreError> {
        let mut inner = self.lock();
        let existing = inner
            .users
            .iter()
            .find(|(_, user)| user.email == record.email)
            .map(|(id, _)| *id);
        let id = existing.unwrap_or_else(|| inner.assign_id());
        let user = user_from_record(id, record);
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        Ok(inner.users.values().find(|user| user.email == email).cloned())
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        Ok(parse_id(id.as_str()).and_then(|key| inner.users.get(&key).cloned()))
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        active: bool,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.lock();
        let Some(key) = parse_id(id.as_str()) else {
            return Ok(None);
        };
        Ok(inner.users.get_mut(&key).map(|user| {
            user.is_active = active;
            user.clone()
        }))
    }

    async fn touch_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(key) = parse_id(id.as_str())
            && let Some(user) = inner.users.get_mut(&key)
        {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.lock();
        Ok(inner.users.values().cloned().collect())
    }

    async fn find_or_create_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .locations
            .values()
            .find(|location| location.key() == *key)
        {
            return Ok(existing.clone());
        }
        let id = inner.assign_id();
        let location = Location {
            id: LocationId::new(id.to_string()),
            city: key.city.clone(),
            street: key.street.clone(),
            house_number: key.house_number.clone(),
        };
        inner.locations.insert(id, location.clone());
        Ok(location)
    }

    async fn insert_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let mut inner = self.lock();
        let id = inner.assign_id();
        let location = Location {
            id: LocationId::new(id.to_string()),
            city: key.city.clone(),
            street: key.street.clone(),
            house_number: key.house_number.clone(),
        };
        inner.locations.insert(id, location.clone());
        Ok(location)
    }

    async fn location_by_id(&self, id: &LocationId) -> Result<Option<Location>, StoreError> {
        let inner = self.lock();
        Ok(parse_id(id.as_str()).and_then(|key| inner.locations.get(&key).cloned()))
    }

    async fn update_location(
        &self,
        id: &LocationId,
        key: &LocationKey,
    ) -> Result<Option<Location>, StoreError> {
        let mut inner = self.lock();
        let Some(row_id) = parse_id(id.as_str()) else {
            return Ok(None);
        };
        Ok(inner.locations.get_mut(&row_id).map(|location| {
            location.city = key.city.clone();
            location.street = key.street.clone();
            location.house_number = key.house_number.clone();
            location.clone()
        }))
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let inner = self.lock();
        Ok(inner.locations.values().cloned().collect())
    }

    async fn insert_apartment(&self, record: &NewApartment) -> Result<Apartment, StoreError> {
        let mut inner = self.lock();
        let owner_id = parse_id(record.owner_id.as_str())
            .ok_or_else(|| StoreError::query(format!("bad owner id: {}", record.owner_id)))?;
        let location_id = match &record.location_id {
            Some(id) => Some(
                parse_id(id.as_str())
                    .ok_or_else(|| StoreError::query(format!("bad location id: {id}")))?,
            ),
            None => None,
        };
        let moderated_by = record
            .moderated_by
            .as_ref()
            .and_then(|id| parse_id(id.as_str()));
        let id = inner.assign_id();
        let row = ApartmentRow {
            id,
            title: record.title.clone(),
            description: record.description.clone(),
            price: record.price,
            owner_id,
            location_id,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            moderated_by,
            moderated_at: record.moderated_at,
        };
        let view = inner.apartment_view(&row);
        inner.apartments.insert(id, row);
        Ok(view)
    }

    async fn apartment_by_id(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError> {
        let inner = self.lock();
        Ok(parse_id(id.as_str())
            .and_then(|key| inner.apartments.get(&key))
            .map(|row| inner.apartment_view(row)))
    }

    async fn update_apartment(
        &self,
        id: &ApartmentId,
        patch: &ApartmentPatch,
    ) -> Result<Option<Apartment>, StoreError> {
        let mut inner = self.lock();
        let Some(key) = parse_id(id.as_str()) else {
            return Ok(None);
        };
        if !inner.apartments.contains_key(&key) {
            return Ok(None);
        }

        if let Some(new_key) = &patch.location {
            let current = inner.apartments.get(&key).and_then(|row| row.location_id);
            match current {
                Some(location_id) => {
                    if let Some(location) = inner.locations.get_mut(&location_id) {
                        location.city = new_key.city.clone();
                        location.street = new_key.street.clone();
                        location.house_number = new_key.house_number.clone();
                    }
                }
                None => {
                    let location_id = inner.assign_id();
                    inner.locations.insert(
                        location_id,
                        Location {
                            id: LocationId::new(location_id.to_string()),
                            city: new_key.city.clone(),
                            street: new_key.street.clone(),
                            house_number: new_key.house_number.clone(),
                        },
                    );
                    if let Some(row) = inner.apartments.get_mut(&key) {
                        row.location_id = Some(location_id);
                    }
                }
            }
        }

        let Some(row) = inner.apartments.get_mut(&key) else {
            return Ok(None);
        };
        if let Some(title) = &patch.title {
            row.title = title.clone();
        }
        if let Some(description) = &patch.description {
            row.description = description.clone();
        }
        if let Some(price) = patch.price {
            row.price = price;
        }
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(Some(inner.apartment_view(&row)))
    }

    async fn delete_apartment(&self, id: &ApartmentId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(key) = parse_id(id.as_str()) else {
            return Ok(false);
        };
        let removed = inner.apartments.remove(&key).is_some();
        if removed {
            inner.observations.retain(|(_, apartment)| *apartment != key);
        }
        Ok(removed)
    }

    async fn apartments_by_owner(&self, owner: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let inner = self.lock();
        let Some(owner_id) = parse_id(owner.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .apartments
            .values()
            .filter(|row| row.owner_id == owner_id)
            .map(|row| inner.apartment_view(row))
            .collect())
    }

    async fn list_apartments(&self, filter: &ListingFilter) -> Result<Vec<Apartment>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .apartments
            .values()
            .filter(|row| inner.visible_to(row, &filter.viewer))
            .skip(usize::try_from(filter.skip).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
            .map(|row| inner.apartment_view(row))
            .collect())
    }

    async fn pending_apartments(&self) -> Result<Vec<Apartment>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .apartments
            .values()
            .filter(|row| row.status == ListingStatus::Pending)
            .map(|row| inner.apartment_view(row))
            .collect())
    }

    async fn moderate_apartment(
        &self,
        id: &ApartmentId,
        status: ListingStatus,
        moderator: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Apartment>, StoreError> {
        let mut inner = self.lock();
        let Some(key) = parse_id(id.as_str()) else {
            return Ok(None);
        };
        let moderator_id = parse_id(moderator.as_str());
        let Some(row) = inner.apartments.get_mut(&key) else {
            return Ok(None);
        };
        row.status = status;
        row.moderated_by = moderator_id;
        row.moderated_at = Some(at);
        let row = row.clone();
        Ok(Some(inner.apartment_view(&row)))
    }

    async fn search_apartments(
        &self,
        query: &SearchQuery,
        viewer: &Viewer,
    ) -> Result<Vec<Apartment>, StoreError> {
        let inner = self.lock();
        let needle = query.text.as_deref().map(str::to_lowercase);
        let city = query.city.as_deref().map(str::to_lowercase);

        let mut hits: Vec<&ApartmentRow> = inner
            .apartments
            .values()
            .filter(|row| inner.visible_to(row, viewer))
            .filter(|row| {
                needle.as_deref().is_none_or(|needle| {
                    row.title.to_lowercase().contains(needle)
                        || row.description.to_lowercase().contains(needle)
                })
            })
            .filter(|row| query.min_price.is_none_or(|min| row.price >= min))
            .filter(|row| query.max_price.is_none_or(|max| row.price <= max))
            .filter(|row| {
                city.as_deref().is_none_or(|city| {
                    row.location_id
                        .and_then(|id| inner.locations.get(&id))
                        .is_some_and(|location| location.city.to_lowercase().contains(city))
                })
            })
            .collect();

        match query.sort {
            Some(SearchSort::PriceAscending) => {
                hits.sort_by(|a, b| a.price.total_cmp(&b.price));
            }
            Some(SearchSort::PriceDescending) => {
                hits.sort_by(|a, b| b.price.total_cmp(&a.price));
            }
            Some(SearchSort::Newest) => hits.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            Some(SearchSort::Oldest) => hits.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            None => {}
        }

        Ok(hits.into_iter().map(|row| inner.apartment_view(row)).collect())
    }

    async fn observe(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let (Some(user_id), Some(apartment_id)) =
            (parse_id(user.as_str()), parse_id(apartment.as_str()))
        else {
            return Ok(false);
        };
        Ok(inner.observations.insert((user_id, apartment_id)))
    }

    async fn unobserve(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let (Some(user_id), Some(apartment_id)) =
            (parse_id(user.as_str()), parse_id(apartment.as_str()))
        else {
            return Ok(false);
        };
        Ok(inner.observations.remove(&(user_id, apartment_id)))
    }

    async fn observed_apartments(&self, user: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let inner = self.lock();
        let Some(user_id) = parse_id(user.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .observations
            .iter()
            .filter(|(observer, _)| *observer == user_id)
            .filter_map(|(_, apartment)| inner.apartments.get(apartment))
            .map(|row| inner.apartment_view(row))
            .collect())
    }

    async fn system_stats(&self) -> Result<SystemStats, StoreError> {
        let inner = self.lock();
        let approved: Vec<f64> = inner
            .apartments
            .values()
            .filter(|row| row.status == ListingStatus::Approved)
            .map(|row| row.price)
            .collect();
        let average_price = if approved.is_empty() {
            0.0
        } else {
            approved.iter().sum::<f64>() / approved.len() as f64
        };
        let owners: BTreeSet<i64> = inner.apartments.values().map(|row| row.owner_id).collect();

        let count_status = |status: ListingStatus| {
            inner
                .apartments
                .values()
                .filter(|row| row.status == status)
                .count() as u64
        };

        Ok(SystemStats {
            total_users: inner.users.len() as u64,
            active_users: inner.users.values().filter(|user| user.is_active).count() as u64,
            total_apartments: inner.apartments.len() as u64,
            pending_apartments: count_status(ListingStatus::Pending),
            approved_apartments: count_status(ListingStatus::Approved),
            rejected_apartments: count_status(ListingStatus::Rejected),
            average_price,
            total_owners: owners.len() as u64,
        })
    }

    async fn city_distribution(&self) -> Result<Vec<CityStats>, StoreError> {
        let inner = self.lock();
        let mut grouped: BTreeMap<Option<String>, (u64, f64)> = BTreeMap::new();
        for row in inner
            .apartments
            .values()
            .filter(|row| row.status == ListingStatus::Approved)
        {
            let city = row
                .location_id
                .and_then(|id| inner.locations.get(&id))
                .map(|location| location.city.clone());
            let entry = grouped.entry(city).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += row.price;
        }
        let mut stats: Vec<CityStats> = grouped
            .into_iter()
            .map(|(city, (count, total))| CityStats {
                city,
                count,
                avg_price: total / count as f64,
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn user_record(email: &str) -> NewUser {
        NewUser::registered(email, "$argon2id$x", "Ada", "Lovelace", "1234567890")
    }

    #[rstest]
    #[tokio::test]
    async fn insert_user_enforces_unique_email() {
        let store = MemoryStore::new();
        store
            .insert_user(&user_record("a@example.com"))
            .await
            .expect("first insert succeeds");
        let err = store
            .insert_user(&user_record("a@example.com"))
            .await
            .expect_err("duplicate insert fails");
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_by_email_keeps_the_original_id() {
        let store = MemoryStore::new();
        let first = store
            .upsert_user_by_email(&user_record("a@example.com"))
            .await
            .expect("insert succeeds");
        let mut changed = user_record("a@example.com");
        changed.first_name = "Augusta".into();
        let second = store
            .upsert_user_by_email(&changed)
            .await
            .expect("upsert succeeds");
        assert_eq!(first.id, second.id);
        assert_eq!(second.first_name, "Augusta");
    }

    #[rstest]
    #[tokio::test]
    async fn find_or_create_location_is_idempotent() {
        let store = MemoryStore::new();
        let key = LocationKey::new("Kyiv", "Khreshchatyk", "10");
        let first = store
            .find_or_create_location(&key)
            .await
            .expect("create succeeds");
        let second = store
            .find_or_create_location(&key)
            .await
            .expect("lookup succeeds");
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_locations().await.expect("list").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn insert_location_always_creates_a_row() {
        let store = MemoryStore::new();
        let key = LocationKey::new("Kyiv", "Khreshchatyk", "10");
        store.insert_location(&key).await.expect("insert succeeds");
        store.insert_location(&key).await.expect("insert succeeds");
        assert_eq!(store.list_locations().await.expect("list").len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_a_listing_drops_its_bookmarks() {
        let store = MemoryStore::new();
        let owner = store
            .insert_user(&user_record("a@example.com"))
            .await
            .expect("insert succeeds");
        let location = store
            .find_or_create_location(&LocationKey::new("Kyiv", "Khreshchatyk", "10"))
            .await
            .expect("create succeeds");
        let listing = store
            .insert_apartment(&NewApartment::created(
                "Flat",
                "Desc",
                500.0,
                owner.id.clone(),
                location.id,
                ListingStatus::Approved,
            ))
            .await
            .expect("insert succeeds");

        assert!(store
            .observe(&owner.id, &listing.id)
            .await
            .expect("observe succeeds"));
        assert!(store
            .delete_apartment(&listing.id)
            .await
            .expect("delete succeeds"));
        assert!(store
            .observed_apartments(&owner.id)
            .await
            .expect("list succeeds")
            .is_empty());
        assert!(!store
            .delete_apartment(&listing.id)
            .await
            .expect("second delete is a no-op"));
    }

    #[rstest]
    #[tokio::test]
    async fn moderation_does_not_exist_for_unknown_ids() {
        let store = MemoryStore::new();
        let outcome = store
            .moderate_apartment(
                &ApartmentId::new("404"),
                ListingStatus::Approved,
                &UserId::new("1"),
                Utc::now(),
            )
            .await
            .expect("operation succeeds");
        assert!(outcome.is_none());
    }
}

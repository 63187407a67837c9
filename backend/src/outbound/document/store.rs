//! MongoDB-backed [`ListingStore`] implementation.
//!
//! Listings embed their address; foreign references are hex strings. The
//! unique indexes built by [`ListingStore::ensure_schema`] enforce the same
//! constraints the relational variants get from SQL: unique email, unique
//! location triple, unique (user, apartment) bookmark pair.

use async_trait::async_trait;
use bson::DateTime as BsonDateTime;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use tracing::info;

use crate::domain::ports::{
    ListingFilter, ListingStore, SearchQuery, SearchSort, StoreError, Viewer,
};
use crate::domain::{
    Apartment, ApartmentId, ApartmentPatch, CityStats, ListingStatus, Location, LocationId,
    LocationKey, NewApartment, NewUser, SystemStats, User, UserId,
};

use super::client;
use super::documents::{ApartmentDoc, LocationDoc, ObservationDoc, UserDoc};

const USERS: &str = "users";
const APARTMENTS: &str = "apartments";
const LOCATIONS: &str = "locations";
const OBSERVATIONS: &str = "apartment_observations";

/// MongoDB implementation of the listing store.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

/// Whether the error is a unique-index collision.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == 11000,
        ErrorKind::Command(command) => command.code == 11000,
        _ => false,
    }
}

/// Map driver failures to the store port error.
fn map_mongo_error(err: mongodb::error::Error) -> StoreError {
    use mongodb::error::ErrorKind;
    if is_duplicate_key(&err) {
        return StoreError::duplicate("unique index");
    }
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            StoreError::connection(err.to_string())
        }
        _ => StoreError::query(err.to_string()),
    }
}

/// Pull a numeric field out of an aggregation result document.
fn numeric_field(doc: &Document, key: &str) -> f64 {
    match doc.get(key) {
        Some(Bson::Double(value)) => *value,
        Some(Bson::Int32(value)) => f64::from(*value),
        Some(Bson::Int64(value)) => *value as f64,
        _ => 0.0,
    }
}

impl MongoStore {
    /// Connect to the given URI and database with bounded retry.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let db = client::connect(uri, db_name).await?;
        Ok(Self { db })
    }

    /// Build a store over an already-selected database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn users(&self) -> Collection<UserDoc> {
        self.db.collection(USERS)
    }

    fn apartments(&self) -> Collection<ApartmentDoc> {
        self.db.collection(APARTMENTS)
    }

    fn locations(&self) -> Collection<LocationDoc> {
        self.db.collection(LOCATIONS)
    }

    fn observations(&self) -> Collection<ObservationDoc> {
        self.db.collection(OBSERVATIONS)
    }

    async fn user_doc_by_email(&self, email: &str) -> Result<Option<UserDoc>, StoreError> {
        self.users()
            .find_one(doc! { "email": email })
            .await
            .map_err(map_mongo_error)
    }

    /// Hex ids of all active accounts; the visibility filter for non-admin
    /// viewers excludes listings owned by anyone else.
    async fn active_owner_ids(&self) -> Result<Vec<String>, StoreError> {
        let docs: Vec<UserDoc> = self
            .users()
            .find(doc! { "is_active": true })
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;
        Ok(docs
            .into_iter()
            .filter_map(|user| user.id.map(|id| id.to_hex()))
            .collect())
    }

    async fn visibility_filter(&self, viewer: &Viewer) -> Result<Document, StoreError> {
        if viewer.is_admin() {
            return Ok(doc! {});
        }
        let active = self.active_owner_ids().await?;
        Ok(doc! {
            "status": ListingStatus::Approved.as_str(),
            "owner_id": { "$in": active },
        })
    }

    async fn collect_apartments(
        &self,
        cursor: mongodb::Cursor<ApartmentDoc>,
    ) -> Result<Vec<Apartment>, StoreError> {
        let docs: Vec<ApartmentDoc> = cursor.try_collect().await.map_err(map_mongo_error)?;
        docs.into_iter().map(ApartmentDoc::into_apartment).collect()
    }

    async fn fetch_apartment(&self, id: &ObjectId) -> Result<Option<Apartment>, StoreError> {
        let doc = self
            .apartments()
            .find_one(doc! { "_id": *id })
            .await
            .map_err(map_mongo_error)?;
        doc.map(ApartmentDoc::into_apartment).transpose()
    }
}

#[async_trait]
impl ListingStore for MongoStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let existing = self
            .db
            .list_collection_names()
            .await
            .map_err(map_mongo_error)?;
        for name in [USERS, APARTMENTS, LOCATIONS, OBSERVATIONS] {
            if !existing.iter().any(|collection| collection == name) {
                self.db
                    .create_collection(name)
                    .await
                    .map_err(map_mongo_error)?;
                info!(collection = name, "created collection");
            }
        }

        let unique = IndexOptions::builder().unique(true).build();

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await
            .map_err(map_mongo_error)?;

        self.apartments()
            .create_index(IndexModel::builder().keys(doc! { "owner_id": 1 }).build())
            .await
            .map_err(map_mongo_error)?;
        self.apartments()
            .create_index(IndexModel::builder().keys(doc! { "status": 1 }).build())
            .await
            .map_err(map_mongo_error)?;
        self.apartments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "title": "text", "description": "text" })
                    .build(),
            )
            .await
            .map_err(map_mongo_error)?;

        self.locations()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "city": 1, "street": 1, "house_number": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await
            .map_err(map_mongo_error)?;

        self.observations()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "apartment_id": 1 })
                    .options(unique)
                    .build(),
            )
            .await
            .map_err(map_mongo_error)?;
        self.observations()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await
            .map_err(map_mongo_error)?;

        info!("document store indexes ready");
        Ok(())
    }

    async fn insert_user(&self, record: &NewUser) -> Result<User, StoreError> {
        let mut doc = UserDoc::from_record(record);
        let outcome = self.users().insert_one(&doc).await.map_err(|err| {
            if is_duplicate_key(&err) {
                StoreError::duplicate("users.email")
            } else {
                map_mongo_error(err)
            }
        })?;
        doc.id = outcome.inserted_id.as_object_id();
        doc.into_user()
    }

    async fn upsert_user_by_email(&self, record: &NewUser) -> Result<User, StoreError> {
        let doc = UserDoc::from_record(record);
        let update = doc! { "$set": {
            "password_hash": doc.password_hash.as_str(),
            "first_name": doc.first_name.as_str(),
            "last_name": doc.last_name.as_str(),
            "phone": doc.phone.as_str(),
            "is_admin": doc.is_admin,
            "is_active": doc.is_active,
            "created_at": doc.created_at,
            "last_login": doc.last_login.map_or(Bson::Null, Bson::DateTime),
        } };
        self.users()
            .update_one(doc! { "email": doc.email.as_str() }, update)
            .upsert(true)
            .await
            .map_err(map_mongo_error)?;
        self.user_doc_by_email(&doc.email)
            .await?
            .ok_or_else(|| StoreError::query("upserted user vanished"))?
            .into_user()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.user_doc_by_email(email)
            .await?
            .map(UserDoc::into_user)
            .transpose()
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        self.users()
            .find_one(doc! { "_id": oid })
            .await
            .map_err(map_mongo_error)?
            .map(UserDoc::into_user)
            .transpose()
    }

    async fn set_user_active(
        &self,
        id: &UserId,
        active: bool,
    ) -> Result<Option<User>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        let outcome = self
            .users()
            .update_one(doc! { "_id": oid }, doc! { "$set": { "is_active": active } })
            .await
            .map_err(map_mongo_error)?;
        if outcome.matched_count == 0 {
            return Ok(None);
        }
        self.user_by_id(id).await
    }

    async fn touch_last_login(&self, id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(());
        };
        self.users()
            .update_one(
                doc! { "_id": oid },
                doc! { "$set": { "last_login": BsonDateTime::from_chrono(at) } },
            )
            .await
            .map_err(map_mongo_error)?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let docs: Vec<UserDoc> = self
            .users()
            .find(doc! {})
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;
        docs.into_iter().map(UserDoc::into_user).collect()
    }

    async fn find_or_create_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let filter = doc! {
            "city": key.city.as_str(),
            "street": key.street.as_str(),
            "house_number": key.house_number.as_str(),
        };
        if let Some(existing) = self
            .locations()
            .find_one(filter.clone())
            .await
            .map_err(map_mongo_error)?
        {
            return existing.into_location();
        }

        let mut doc = LocationDoc {
            id: None,
            city: key.city.clone(),
            street: key.street.clone(),
            house_number: key.house_number.clone(),
        };
        match self.locations().insert_one(&doc).await {
            Ok(outcome) => {
                doc.id = outcome.inserted_id.as_object_id();
                doc.into_location()
            }
            // Lost a race against a concurrent create of the same triple.
            Err(err) if is_duplicate_key(&err) => self
                .locations()
                .find_one(filter)
                .await
                .map_err(map_mongo_error)?
                .ok_or_else(|| StoreError::query("location vanished after duplicate insert"))?
                .into_location(),
            Err(err) => Err(map_mongo_error(err)),
        }
    }

    async fn insert_location(&self, key: &LocationKey) -> Result<Location, StoreError> {
        let mut doc = LocationDoc {
            id: None,
            city: key.city.clone(),
            street: key.street.clone(),
            house_number: key.house_number.clone(),
        };
        let outcome = self
            .locations()
            .insert_one(&doc)
            .await
            .map_err(map_mongo_error)?;
        doc.id = outcome.inserted_id.as_object_id();
        doc.into_location()
    }

    async fn location_by_id(&self, id: &LocationId) -> Result<Option<Location>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        self.locations()
            .find_one(doc! { "_id": oid })
            .await
            .map_err(map_mongo_error)?
            .map(LocationDoc::into_location)
            .transpose()
    }

    async fn update_location(
        &self,
        id: &LocationId,
        key: &LocationKey,
    ) -> Result<Option<Location>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        let fields = doc! {
            "city": key.city.as_str(),
            "street": key.street.as_str(),
            "house_number": key.house_number.as_str(),
        };
        let outcome = self
            .locations()
            .update_one(doc! { "_id": oid }, doc! { "$set": fields.clone() })
            .await
            .map_err(map_mongo_error)?;
        if outcome.matched_count == 0 {
            return Ok(None);
        }
        // Keep embedded copies in listings consistent with the source row.
        self.apartments()
            .update_many(
                doc! { "location._id": oid },
                doc! { "$set": {
                    "location.city": key.city.as_str(),
                    "location.street": key.street.as_str(),
                    "location.house_number": key.house_number.as_str(),
                } },
            )
            .await
            .map_err(map_mongo_error)?;
        self.location_by_id(id).await
    }

    async fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
        let docs: Vec<LocationDoc> = self
            .locations()
            .find(doc! {})
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;
        docs.into_iter().map(LocationDoc::into_location).collect()
    }

    async fn insert_apartment(&self, record: &NewApartment) -> Result<Apartment, StoreError> {
        let location = match &record.location_id {
            Some(id) => {
                let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
                    return Err(StoreError::query(format!("unparseable location id: {id}")));
                };
                self.locations()
                    .find_one(doc! { "_id": oid })
                    .await
                    .map_err(map_mongo_error)?
            }
            None => None,
        };

        let mut doc = ApartmentDoc::from_record(record, location);
        let outcome = self
            .apartments()
            .insert_one(&doc)
            .await
            .map_err(map_mongo_error)?;
        doc.id = outcome.inserted_id.as_object_id();
        doc.into_apartment()
    }

    async fn apartment_by_id(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        self.fetch_apartment(&oid).await
    }

    async fn update_apartment(
        &self,
        id: &ApartmentId,
        patch: &ApartmentPatch,
    ) -> Result<Option<Apartment>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        let Some(current) = self
            .apartments()
            .find_one(doc! { "_id": oid })
            .await
            .map_err(map_mongo_error)?
        else {
            return Ok(None);
        };

        if let Some(new_key) = &patch.location {
            match current.location.as_ref().and_then(|location| location.id) {
                Some(location_id) => {
                    self.update_location(
                        &LocationId::new(location_id.to_hex()),
                        new_key,
                    )
                    .await?;
                }
                None => {
                    // No address on the listing yet; resolve one and embed it.
                    let location = self.find_or_create_location(new_key).await?;
                    let Ok(location_oid) = ObjectId::parse_str(location.id.as_str()) else {
                        return Err(StoreError::query("freshly created location id unparseable"));
                    };
                    self.apartments()
                        .update_one(
                            doc! { "_id": oid },
                            doc! { "$set": { "location": {
                                "_id": location_oid,
                                "city": location.city.as_str(),
                                "street": location.street.as_str(),
                                "house_number": location.house_number.as_str(),
                            } } },
                        )
                        .await
                        .map_err(map_mongo_error)?;
                }
            }
        }

        let mut fields = doc! { "updated_at": BsonDateTime::from_chrono(Utc::now()) };
        if let Some(title) = &patch.title {
            fields.insert("title", title.as_str());
        }
        if let Some(description) = &patch.description {
            fields.insert("description", description.as_str());
        }
        if let Some(price) = patch.price {
            fields.insert("price", price);
        }
        self.apartments()
            .update_one(doc! { "_id": oid }, doc! { "$set": fields })
            .await
            .map_err(map_mongo_error)?;

        self.fetch_apartment(&oid).await
    }

    async fn delete_apartment(&self, id: &ApartmentId) -> Result<bool, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(false);
        };
        let outcome = self
            .apartments()
            .delete_one(doc! { "_id": oid })
            .await
            .map_err(map_mongo_error)?;
        if outcome.deleted_count > 0 {
            self.observations()
                .delete_many(doc! { "apartment_id": oid.to_hex() })
                .await
                .map_err(map_mongo_error)?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn apartments_by_owner(&self, owner: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let cursor = self
            .apartments()
            .find(doc! { "owner_id": owner.as_str() })
            .await
            .map_err(map_mongo_error)?;
        self.collect_apartments(cursor).await
    }

    async fn list_apartments(&self, filter: &ListingFilter) -> Result<Vec<Apartment>, StoreError> {
        let query = self.visibility_filter(&filter.viewer).await?;
        let cursor = self
            .apartments()
            .find(query)
            .skip(filter.skip)
            .limit(i64::try_from(filter.limit).unwrap_or(i64::MAX))
            .await
            .map_err(map_mongo_error)?;
        self.collect_apartments(cursor).await
    }

    async fn pending_apartments(&self) -> Result<Vec<Apartment>, StoreError> {
        let cursor = self
            .apartments()
            .find(doc! { "status": ListingStatus::Pending.as_str() })
            .await
            .map_err(map_mongo_error)?;
        self.collect_apartments(cursor).await
    }

    async fn moderate_apartment(
        &self,
        id: &ApartmentId,
        status: ListingStatus,
        moderator: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Apartment>, StoreError> {
        let Ok(oid) = ObjectId::parse_str(id.as_str()) else {
            return Ok(None);
        };
        let outcome = self
            .apartments()
            .update_one(
                doc! { "_id": oid },
                doc! { "$set": {
                    "status": status.as_str(),
                    "moderated_by": moderator.as_str(),
                    "moderated_at": BsonDateTime::from_chrono(at),
                } },
            )
            .await
            .map_err(map_mongo_error)?;
        if outcome.matched_count == 0 {
            return Ok(None);
        }
        self.fetch_apartment(&oid).await
    }

    async fn search_apartments(
        &self,
        query: &SearchQuery,
        viewer: &Viewer,
    ) -> Result<Vec<Apartment>, StoreError> {
        let mut filter = self.visibility_filter(viewer).await?;

        if let Some(text) = query.text.as_deref().filter(|text| !text.trim().is_empty()) {
            filter.insert("$text", doc! { "$search": text });
        }
        let mut price = Document::new();
        if let Some(min) = query.min_price {
            price.insert("$gte", min);
        }
        if let Some(max) = query.max_price {
            price.insert("$lte", max);
        }
        if !price.is_empty() {
            filter.insert("price", price);
        }
        if let Some(city) = query.city.as_deref().filter(|city| !city.is_empty()) {
            filter.insert("location.city", doc! { "$regex": city, "$options": "i" });
        }

        let sort = match query.sort {
            Some(SearchSort::PriceAscending) => Some(doc! { "price": 1 }),
            Some(SearchSort::PriceDescending) => Some(doc! { "price": -1 }),
            Some(SearchSort::Newest) => Some(doc! { "created_at": -1 }),
            Some(SearchSort::Oldest) => Some(doc! { "created_at": 1 }),
            None => None,
        };

        let apartments = self.apartments();
        let mut find = apartments.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        let cursor = find.await.map_err(map_mongo_error)?;
        self.collect_apartments(cursor).await
    }

    async fn observe(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let doc = ObservationDoc {
            id: None,
            user_id: user.to_string(),
            apartment_id: apartment.to_string(),
            created_at: BsonDateTime::from_chrono(Utc::now()),
        };
        match self.observations().insert_one(&doc).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(err) => Err(map_mongo_error(err)),
        }
    }

    async fn unobserve(&self, user: &UserId, apartment: &ApartmentId) -> Result<bool, StoreError> {
        let outcome = self
            .observations()
            .delete_one(doc! { "user_id": user.as_str(), "apartment_id": apartment.as_str() })
            .await
            .map_err(map_mongo_error)?;
        Ok(outcome.deleted_count > 0)
    }

    async fn observed_apartments(&self, user: &UserId) -> Result<Vec<Apartment>, StoreError> {
        let observations: Vec<ObservationDoc> = self
            .observations()
            .find(doc! { "user_id": user.as_str() })
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;
        let ids: Vec<ObjectId> = observations
            .iter()
            .filter_map(|observation| ObjectId::parse_str(&observation.apartment_id).ok())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .apartments()
            .find(doc! { "_id": { "$in": ids } })
            .await
            .map_err(map_mongo_error)?;
        self.collect_apartments(cursor).await
    }

    async fn system_stats(&self) -> Result<SystemStats, StoreError> {
        let total_users = self
            .users()
            .count_documents(doc! {})
            .await
            .map_err(map_mongo_error)?;
        let active_users = self
            .users()
            .count_documents(doc! { "is_active": true })
            .await
            .map_err(map_mongo_error)?;

        let apartments = self.apartments();
        let total_apartments = apartments
            .count_documents(doc! {})
            .await
            .map_err(map_mongo_error)?;
        let pending_apartments = apartments
            .count_documents(doc! { "status": ListingStatus::Pending.as_str() })
            .await
            .map_err(map_mongo_error)?;
        let approved_apartments = apartments
            .count_documents(doc! { "status": ListingStatus::Approved.as_str() })
            .await
            .map_err(map_mongo_error)?;
        let rejected_apartments = apartments
            .count_documents(doc! { "status": ListingStatus::Rejected.as_str() })
            .await
            .map_err(map_mongo_error)?;

        let pipeline = vec![
            doc! { "$match": { "status": ListingStatus::Approved.as_str() } },
            doc! { "$group": { "_id": null, "average": { "$avg": "$price" } } },
        ];
        let results: Vec<Document> = apartments
            .aggregate(pipeline)
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;
        let average_price = results
            .first()
            .map_or(0.0, |doc| numeric_field(doc, "average"));

        let owners = apartments
            .distinct("owner_id", doc! {})
            .await
            .map_err(map_mongo_error)?;

        Ok(SystemStats {
            total_users,
            active_users,
            total_apartments,
            pending_apartments,
            approved_apartments,
            rejected_apartments,
            average_price,
            total_owners: owners.len() as u64,
        })
    }

    async fn city_distribution(&self) -> Result<Vec<CityStats>, StoreError> {
        let pipeline = vec![
            doc! { "$match": { "status": ListingStatus::Approved.as_str() } },
            doc! { "$group": {
                "_id": "$location.city",
                "count": { "$sum": 1 },
                "avg_price": { "$avg": "$price" },
            } },
            doc! { "$sort": { "count": -1 } },
        ];
        let results: Vec<Document> = self
            .apartments()
            .aggregate(pipeline)
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;

        Ok(results
            .into_iter()
            .map(|doc| CityStats {
                city: doc.get_str("_id").ok().map(ToOwned::to_owned),
                count: u64::try_from(doc.get_i64("count").unwrap_or_else(|_| {
                    i64::from(doc.get_i32("count").unwrap_or(0))
                }))
                .unwrap_or(0),
                avg_price: numeric_field(&doc, "avg_price"),
            })
            .collect())
    }
}

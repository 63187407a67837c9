//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the database migrations exactly; Diesel uses
//! them for compile-time query validation. Regenerate with
//! `diesel print-schema` after changing the migrations.

diesel::table! {
    /// Registered accounts.
    users (id) {
        /// Serial primary key.
        id -> Int4,
        /// Unique account email.
        email -> Varchar,
        /// Argon2id hash in PHC string format.
        password_hash -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        phone -> Varchar,
        is_admin -> Bool,
        is_active -> Bool,
        created_at -> Timestamptz,
        last_login -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Deduplicated addresses; unique on (city, street, house_number).
    locations (id) {
        /// Serial primary key.
        id -> Int4,
        city -> Varchar,
        street -> Varchar,
        house_number -> Varchar,
    }
}

diesel::table! {
    /// Listings.
    apartments (id) {
        /// Serial primary key.
        id -> Int4,
        title -> Varchar,
        description -> Text,
        price -> Float8,
        /// Owning account; cascades on account deletion.
        owner_id -> Int4,
        /// Referenced address; set to NULL when the address is deleted.
        location_id -> Nullable<Int4>,
        /// pending | approved | rejected.
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        moderated_by -> Nullable<Int4>,
        moderated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Saved-listing bookmarks; unique on (user_id, apartment_id).
    observations (id) {
        /// Serial primary key.
        id -> Int4,
        user_id -> Int4,
        apartment_id -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(apartments -> users (owner_id));
diesel::joinable!(apartments -> locations (location_id));
diesel::joinable!(observations -> users (user_id));
diesel::joinable!(observations -> apartments (apartment_id));

diesel::allow_tables_to_appear_in_same_query!(users, locations, apartments, observations);

//! PostgreSQL persistence adapter using Diesel ORM.
//!
//! Thin translation layer between Diesel rows and domain entities, with
//! async-safe pooling via `bb8` and schema management through embedded
//! Diesel migrations. No business logic lives here.

mod error_map;
mod models;
mod pool;
mod schema;
mod store;

pub use pool::{DbPool, PoolConfig, PoolError};
pub use store::{DieselStore, MIGRATIONS};

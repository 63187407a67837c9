//! Mapping from pool/Diesel failures to the store port error.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::StoreError;

use super::pool::PoolError;

/// Map pool errors to store errors.
pub(crate) fn map_pool_error(error: PoolError) -> StoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            StoreError::connection(message)
        }
    }
}

/// Map Diesel errors to store errors.
///
/// Unique violations surface as [`StoreError::Duplicate`] carrying the
/// constraint name so callers can tell which key collided.
pub(crate) fn map_diesel_error(error: DieselError) -> StoreError {
    if let DieselError::DatabaseError(kind, info) = &error {
        debug!(?kind, message = info.message(), "diesel operation failed");
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::duplicate(info.constraint_name().unwrap_or("unique constraint").to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            StoreError::connection("database connection error")
        }
        DieselError::NotFound => StoreError::query("record not found"),
        other => StoreError::query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;

    #[test]
    fn not_found_maps_to_query_error() {
        assert_eq!(
            map_diesel_error(DieselError::NotFound),
            StoreError::query("record not found")
        );
    }

    #[test]
    fn pool_errors_map_to_connection_errors() {
        assert_eq!(
            map_pool_error(PoolError::checkout("timed out")),
            StoreError::connection("timed out")
        );
    }
}

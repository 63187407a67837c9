//! Domain-level error types.
//!
//! These errors are transport agnostic. Inbound adapters map them to HTTP
//! responses; the migration binary maps them to log lines and exit codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// Authentication failed or is missing.
    Unauthorized,
    /// Authenticated but not permitted to perform this action.
    Forbidden,
    /// The requested resource does not exist.
    NotFound,
    /// A unique constraint (notably the account email) was violated.
    DuplicateKey,
    /// The backing store could not be reached.
    ServiceUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` is non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use domivka::domain::{Error, ErrorCode};
///
/// let err = Error::not_found("no such listing");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    #[schema(example = "invalid_request")]
    code: ErrorCode,
    #[schema(example = "Something went wrong")]
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl Error {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        debug_assert!(!message.trim().is_empty(), "error message must not be empty");
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message returned to adapters.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary structured details for adapters.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Build an [`ErrorCode::InvalidRequest`] error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Build an [`ErrorCode::Unauthorized`] error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Build an [`ErrorCode::Forbidden`] error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Build an [`ErrorCode::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Build an [`ErrorCode::DuplicateKey`] error.
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateKey, message)
    }

    /// Build an [`ErrorCode::ServiceUnavailable`] error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Build an [`ErrorCode::InternalError`] error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::invalid_request("bad"), ErrorCode::InvalidRequest)]
    #[case(Error::unauthorized("no"), ErrorCode::Unauthorized)]
    #[case(Error::forbidden("no"), ErrorCode::Forbidden)]
    #[case(Error::not_found("gone"), ErrorCode::NotFound)]
    #[case(Error::duplicate_key("email taken"), ErrorCode::DuplicateKey)]
    #[case(Error::service_unavailable("down"), ErrorCode::ServiceUnavailable)]
    #[case(Error::internal("boom"), ErrorCode::InternalError)]
    fn constructors_set_expected_codes(#[case] err: Error, #[case] expected: ErrorCode) {
        assert_eq!(err.code(), expected);
    }

    #[rstest]
    fn details_round_trip_through_serde() {
        let err = Error::invalid_request("bad field")
            .with_details(serde_json::json!({ "field": "email" }));
        let json = serde_json::to_value(&err).expect("serializable");
        assert_eq!(json["code"], "invalid_request");
        assert_eq!(json["details"]["field"], "email");
    }

    #[rstest]
    fn details_are_omitted_when_absent() {
        let json = serde_json::to_value(Error::not_found("missing")).expect("serializable");
        assert!(json.get("details").is_none());
    }
}

//! HTTP adapter mapping for domain errors.
//!
//! Purpose: keep the domain error type HTTP-agnostic while allowing Actix
//! handlers to turn domain failures into consistent JSON responses and
//! status codes.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use tracing::error;

use crate::domain::{Error, ErrorCode};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, Error>;

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::DuplicateKey => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn redact_if_internal(error: &Error) -> Error {
    if matches!(error.code(), ErrorCode::InternalError) {
        Error::internal("Internal server error")
    } else {
        error.clone()
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self.code(), ErrorCode::InternalError) {
            error!(message = %self.message(), "internal error surfaced to HTTP boundary");
        }
        HttpResponse::build(self.status_code()).json(redact_if_internal(self))
    }
}

impl From<actix_web::Error> for Error {
    fn from(err: actix_web::Error) -> Self {
        // Do not leak implementation details to clients.
        error!(error = %err, "actix error promoted to domain error");
        Self::internal("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::InvalidRequest, StatusCode::BAD_REQUEST)]
    #[case(ErrorCode::Unauthorized, StatusCode::UNAUTHORIZED)]
    #[case(ErrorCode::Forbidden, StatusCode::FORBIDDEN)]
    #[case(ErrorCode::NotFound, StatusCode::NOT_FOUND)]
    #[case(ErrorCode::DuplicateKey, StatusCode::CONFLICT)]
    #[case(ErrorCode::ServiceUnavailable, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(ErrorCode::InternalError, StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_mapping(#[case] code: ErrorCode, #[case] status: StatusCode) {
        assert_eq!(Error::new(code, "x").status_code(), status);
    }

    #[rstest]
    fn internal_messages_are_redacted() {
        let response = Error::internal("database password is hunter2").error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The body is rebuilt from a redacted clone; the original message
        // never reaches the wire.
        let redacted = redact_if_internal(&Error::internal("database password is hunter2"));
        assert_eq!(redacted.message(), "Internal server error");
    }
}

//! Account endpoints: registration, login, logout, profile.

use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::accounts::Registration;
use crate::domain::auth::{CredentialValidationError, LoginCredentials};
use crate::domain::{Apartment, Error, User};

use super::auth::require_user;
use super::session::SessionContext;
use super::state::HttpState;
use super::ApiResult;

/// Registration request body for `POST /register/`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Desired account email.
    pub email: String,
    /// Plaintext password; only its Argon2id hash is ever stored.
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// Login request body for `POST /login/`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Profile payload: the account plus every listing it owns.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: User,
    pub apartments: Vec<Apartment>,
}

fn map_credential_error(err: CredentialValidationError) -> Error {
    match err {
        CredentialValidationError::EmptyEmail => Error::invalid_request("email must not be empty")
            .with_details(json!({ "field": "email" })),
        CredentialValidationError::EmptyPassword => {
            Error::invalid_request("password must not be empty")
                .with_details(json!({ "field": "password" }))
        }
    }
}

/// Create a new account.
#[utoipa::path(
    post,
    path = "/register/",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid request", body = Error),
        (status = 409, description = "Email already registered", body = Error)
    ),
    tags = ["accounts"],
    security([])
)]
#[post("/register/")]
pub async fn register(
    state: web::Data<HttpState>,
    payload: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    let user = state
        .accounts
        .register(Registration {
            email: body.email,
            password: body.password,
            first_name: body.first_name,
            last_name: body.last_name,
            phone: body.phone,
        })
        .await?;
    Ok(HttpResponse::Created().json(user))
}

/// Authenticate and establish a session.
///
/// On success the signed session cookie carries the account email as its
/// subject.
#[utoipa::path(
    post,
    path = "/login/",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login success", body = User,
         headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 401, description = "Invalid credentials", body = Error),
        (status = 403, description = "Account deactivated", body = Error)
    ),
    tags = ["accounts"],
    security([])
)]
#[post("/login/")]
pub async fn login(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    let credentials = LoginCredentials::try_from_parts(&body.email, &body.password)
        .map_err(map_credential_error)?;
    let user = state.accounts.login(&credentials).await?;
    session.persist_subject(&user.email)?;
    Ok(HttpResponse::Ok().json(user))
}

/// End the session.
#[utoipa::path(
    post,
    path = "/logout/",
    responses((status = 204, description = "Session ended")),
    tags = ["accounts"],
    security([])
)]
#[post("/logout/")]
pub async fn logout(session: SessionContext) -> HttpResponse {
    session.purge();
    HttpResponse::NoContent().finish()
}

/// The authenticated account and its listings.
#[utoipa::path(
    get,
    path = "/profile/",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["accounts"]
)]
#[get("/profile/")]
pub async fn profile(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<ProfileResponse>> {
    let user = require_user(&session, &state).await?;
    let apartments = state.listings.by_owner(&user.id).await?;
    Ok(web::Json(ProfileResponse { user, apartments }))
}

/// Listings the authenticated account has bookmarked.
#[utoipa::path(
    get,
    path = "/profile/observations",
    responses(
        (status = 200, description = "Bookmarked listings", body = [Apartment]),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["accounts"]
)]
#[get("/profile/observations")]
pub async fn observations(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<Apartment>>> {
    let user = require_user(&session, &state).await?;
    let observed = state.listings.observed(&user.id).await?;
    Ok(web::Json(observed))
}

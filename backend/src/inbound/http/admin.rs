//! Administration endpoints: moderation queue, user management, stats.

use actix_web::{get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::{Apartment, ApartmentId, Error, ListingStatus, SystemStats, User, UserId};

use super::ApiResult;
use super::auth::require_admin;
use super::session::SessionContext;
use super::state::HttpState;

/// Admin panel payload: the moderation queue, all accounts, and the
/// system-wide counters.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminPanel {
    pub pending: Vec<Apartment>,
    pub users: Vec<User>,
    pub stats: SystemStats,
}

/// Request body for the moderation endpoint.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ModerateRequest {
    /// Target status: `approved` or `rejected`.
    pub status: String,
}

/// Moderation queue, accounts, and statistics in one payload.
#[utoipa::path(
    get,
    path = "/admin/",
    responses(
        (status = 200, description = "Admin panel data", body = AdminPanel),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Not an administrator", body = Error)
    ),
    tags = ["admin"]
)]
#[get("/admin/")]
pub async fn panel(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<AdminPanel>> {
    require_admin(&session, &state).await?;
    let pending = state.listings.pending().await?;
    let users = state.accounts.list_users().await?;
    let stats = state.listings.stats().await?;
    Ok(web::Json(AdminPanel {
        pending,
        users,
        stats,
    }))
}

/// Flip an account's active flag.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/toggle-status",
    params(("id" = String, Path, description = "Account identifier")),
    responses(
        (status = 200, description = "Updated account", body = User),
        (status = 403, description = "Not an administrator", body = Error),
        (status = 404, description = "No such account", body = Error)
    ),
    tags = ["admin"]
)]
#[post("/admin/users/{id}/toggle-status")]
pub async fn toggle_user_status(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<User>> {
    require_admin(&session, &state).await?;
    let id = UserId::new(path.into_inner());
    let user = state.accounts.toggle_active(&id).await?;
    Ok(web::Json(user))
}

/// Resolve a pending listing.
///
/// The target status must be `approved` or `rejected`; that restriction
/// lives here, not in the repository, so re-applying a status to an
/// already-moderated listing simply overwrites it.
#[utoipa::path(
    post,
    path = "/admin/apartments/{id}/moderate",
    params(("id" = String, Path, description = "Listing identifier")),
    request_body = ModerateRequest,
    responses(
        (status = 200, description = "Moderated listing", body = Apartment),
        (status = 400, description = "Invalid target status", body = Error),
        (status = 403, description = "Not an administrator", body = Error),
        (status = 404, description = "No such listing", body = Error)
    ),
    tags = ["admin"]
)]
#[post("/admin/apartments/{id}/moderate")]
pub async fn moderate(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<ModerateRequest>,
) -> ApiResult<web::Json<Apartment>> {
    let moderator = require_admin(&session, &state).await?;
    let id = ApartmentId::new(path.into_inner());

    let status = ListingStatus::parse(&payload.status)
        .filter(|status| status.is_moderation_target())
        .ok_or_else(|| {
            Error::invalid_request("status must be approved or rejected")
                .with_details(json!({ "field": "status", "given": payload.status }))
        })?;

    let apartment = state.listings.moderate(&id, status, &moderator).await?;
    Ok(web::Json(apartment))
}

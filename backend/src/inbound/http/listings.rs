//! Listing endpoints: catalogue, CRUD, bookmarks.
//!
//! Ownership is enforced here, not in the repository: only the owner or an
//! administrator may edit or delete a listing.

use actix_web::{HttpResponse, delete, get, post, put, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::domain::ports::{ListingFilter, Viewer};
use crate::domain::listings::ListingDraft;
use crate::domain::{Apartment, ApartmentId, ApartmentPatch, Error, LocationKey, User};

use super::ApiResult;
use super::auth::{current_user, require_user};
use super::session::SessionContext;
use super::state::HttpState;

/// Address fields accepted on listing creation and edits.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    pub city: String,
    pub street: String,
    pub house_number: String,
}

impl From<LocationRequest> for LocationKey {
    fn from(value: LocationRequest) -> Self {
        Self::new(value.city, value.street, value.house_number)
    }
}

/// Request body for `POST /apartments/`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateListingRequest {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub location: LocationRequest,
}

/// Request body for `PUT /apartments/{id}`; omitted fields stay unchanged.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<LocationRequest>,
}

/// Pagination query for catalogue pages.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// Offset into the result set.
    pub skip: Option<u64>,
    /// Page size, capped server-side.
    pub limit: Option<u64>,
}

fn filter_for(viewer: Viewer, page: &PageQuery) -> ListingFilter {
    ListingFilter::for_viewer(viewer).paged(
        page.skip.unwrap_or(0),
        page.limit
            .unwrap_or(ListingFilter::DEFAULT_LIMIT)
            .min(ListingFilter::DEFAULT_LIMIT),
    )
}

/// Whether this viewer may see the listing's detail page.
fn detail_visible(apartment: &Apartment, owner: Option<&User>, viewer: Option<&User>) -> bool {
    if let Some(viewer) = viewer {
        if viewer.is_admin || viewer.id == apartment.owner_id {
            return true;
        }
    }
    apartment.status == crate::domain::ListingStatus::Approved
        && owner.is_some_and(|owner| owner.is_active)
}

/// Approved listings, as shown on the landing page.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Visible listings", body = [Apartment])),
    tags = ["listings"],
    security([])
)]
#[get("/")]
pub async fn home(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<Apartment>>> {
    let viewer = Viewer::for_user(current_user(&session, &state).await?.as_ref());
    let listings = state
        .listings
        .list(&ListingFilter::for_viewer(viewer))
        .await?;
    Ok(web::Json(listings))
}

/// Catalogue page for the current viewer.
#[utoipa::path(
    get,
    path = "/apartments/",
    params(PageQuery),
    responses((status = 200, description = "Visible listings", body = [Apartment])),
    tags = ["listings"],
    security([])
)]
#[get("/apartments/")]
pub async fn list(
    state: web::Data<HttpState>,
    session: SessionContext,
    page: web::Query<PageQuery>,
) -> ApiResult<web::Json<Vec<Apartment>>> {
    let viewer = Viewer::for_user(current_user(&session, &state).await?.as_ref());
    let listings = state.listings.list(&filter_for(viewer, &page)).await?;
    Ok(web::Json(listings))
}

/// Create a listing owned by the authenticated account.
#[utoipa::path(
    post,
    path = "/apartments/",
    request_body = CreateListingRequest,
    responses(
        (status = 201, description = "Listing created", body = Apartment),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorised", body = Error)
    ),
    tags = ["listings"]
)]
#[post("/apartments/")]
pub async fn create(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<CreateListingRequest>,
) -> ApiResult<HttpResponse> {
    let user = require_user(&session, &state).await?;
    let body = payload.into_inner();
    let apartment = state
        .listings
        .create(
            &user,
            ListingDraft {
                title: body.title,
                description: body.description,
                price: body.price,
                location: body.location.into(),
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(apartment))
}

/// One listing's detail view.
#[utoipa::path(
    get,
    path = "/apartments/{id}",
    params(("id" = String, Path, description = "Listing identifier")),
    responses(
        (status = 200, description = "Listing", body = Apartment),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["listings"],
    security([])
)]
#[get("/apartments/{id}")]
pub async fn get_one(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<Apartment>> {
    let id = ApartmentId::new(path.into_inner());
    let apartment = state.listings.get(&id).await?;
    let viewer = current_user(&session, &state).await?;
    let owner = state.accounts.user_by_id(&apartment.owner_id).await?;
    if !detail_visible(&apartment, owner.as_ref(), viewer.as_ref()) {
        return Err(Error::not_found("no such listing"));
    }
    Ok(web::Json(apartment))
}

/// Edit a listing. Owner or administrator only.
#[utoipa::path(
    put,
    path = "/apartments/{id}",
    params(("id" = String, Path, description = "Listing identifier")),
    request_body = UpdateListingRequest,
    responses(
        (status = 200, description = "Updated listing", body = Apartment),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["listings"]
)]
#[put("/apartments/{id}")]
pub async fn update(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<UpdateListingRequest>,
) -> ApiResult<web::Json<Apartment>> {
    let user = require_user(&session, &state).await?;
    let id = ApartmentId::new(path.into_inner());
    let apartment = state.listings.get(&id).await?;
    if apartment.owner_id != user.id && !user.is_admin {
        return Err(Error::forbidden("only the owner may edit this listing"));
    }

    let body = payload.into_inner();
    let patch = ApartmentPatch {
        title: body.title,
        description: body.description,
        price: body.price,
        location: body.location.map(LocationKey::from),
    };
    let updated = state.listings.update(&id, &patch).await?;
    Ok(web::Json(updated))
}

/// Delete a listing. Owner or administrator only.
#[utoipa::path(
    delete,
    path = "/apartments/{id}",
    params(("id" = String, Path, description = "Listing identifier")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["listings"]
)]
#[delete("/apartments/{id}")]
pub async fn remove(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = require_user(&session, &state).await?;
    let id = ApartmentId::new(path.into_inner());
    let apartment = state.listings.get(&id).await?;
    if apartment.owner_id != user.id && !user.is_admin {
        return Err(Error::forbidden("only the owner may delete this listing"));
    }
    if !state.listings.delete(&id).await? {
        return Err(Error::not_found("no such listing"));
    }
    Ok(HttpResponse::NoContent().finish())
}

/// Bookmark a listing.
#[utoipa::path(
    post,
    path = "/apartments/{id}/observe",
    params(("id" = String, Path, description = "Listing identifier")),
    responses(
        (status = 200, description = "Bookmark state"),
        (status = 404, description = "Not found", body = Error)
    ),
    tags = ["listings"]
)]
#[post("/apartments/{id}/observe")]
pub async fn observe(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = require_user(&session, &state).await?;
    let id = ApartmentId::new(path.into_inner());
    state.listings.observe(&user.id, &id).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "observed": true })))
}

/// Drop a bookmark.
#[utoipa::path(
    delete,
    path = "/apartments/{id}/observe",
    params(("id" = String, Path, description = "Listing identifier")),
    responses((status = 200, description = "Bookmark state")),
    tags = ["listings"]
)]
#[delete("/apartments/{id}/observe")]
pub async fn unobserve(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = require_user(&session, &state).await?;
    let id = ApartmentId::new(path.into_inner());
    state.listings.unobserve(&user.id, &id).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "observed": false })))
}

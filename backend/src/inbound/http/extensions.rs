//! Endpoints backed by the extended relational variant.
//!
//! These answer 404 when the active backend has no [`ExtendedQueries`]
//! implementation: the capability genuinely does not exist there.

use std::collections::BTreeMap;
use std::sync::Arc;

use actix_web::{get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::ports::{ExtendedQueries, ListingAnalytics, NearbyApartment, OwnerActivity};
use crate::domain::{Apartment, ApartmentId, Error, LocationId};

use super::ApiResult;
use super::auth::require_admin;
use super::session::SessionContext;
use super::state::HttpState;

fn extended(state: &HttpState) -> ApiResult<Arc<dyn ExtendedQueries>> {
    state
        .extended
        .clone()
        .ok_or_else(|| Error::not_found("this deployment does not support extended queries"))
}

/// Query string for the nearby-listings endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct NearbyParams {
    pub lat: f64,
    pub lon: f64,
    /// Search radius in kilometres; defaults to 5.
    pub radius_km: Option<f64>,
}

/// Request body for storing address coordinates.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CoordinatesRequest {
    pub lat: f64,
    pub lon: f64,
}

/// Approved listings whose features contain every given key/value pair.
///
/// Feature filters arrive as arbitrary query-string pairs, e.g.
/// `?balcony=true&floor=3`.
#[utoipa::path(
    get,
    path = "/api/apartments/features",
    responses(
        (status = 200, description = "Matching listings", body = [Apartment]),
        (status = 404, description = "Backend without feature support", body = Error)
    ),
    tags = ["extended"],
    security([])
)]
#[get("/api/apartments/features")]
pub async fn by_features(
    state: web::Data<HttpState>,
    query: web::Query<BTreeMap<String, String>>,
) -> ApiResult<web::Json<Vec<Apartment>>> {
    let port = extended(&state)?;
    let listings = port.apartments_with_features(&query.into_inner()).await?;
    Ok(web::Json(listings))
}

/// Merge key/value pairs into a listing's features. Administrator only.
#[utoipa::path(
    post,
    path = "/api/apartments/{id}/features",
    params(("id" = String, Path, description = "Listing identifier")),
    responses(
        (status = 200, description = "Features updated", body = Apartment),
        (status = 404, description = "No such listing or unsupported backend", body = Error)
    ),
    tags = ["extended"]
)]
#[post("/api/apartments/{id}/features")]
pub async fn update_features(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<BTreeMap<String, String>>,
) -> ApiResult<web::Json<Apartment>> {
    require_admin(&session, &state).await?;
    let port = extended(&state)?;
    let id = ApartmentId::new(path.into_inner());
    if !port.update_features(&id, &payload.into_inner()).await? {
        return Err(Error::not_found("no such listing"));
    }
    let apartment = state.listings.get(&id).await?;
    Ok(web::Json(apartment))
}

/// Approved listings near a point, nearest first.
#[utoipa::path(
    get,
    path = "/api/apartments/nearby",
    params(NearbyParams),
    responses(
        (status = 200, description = "Nearby listings", body = [NearbyApartment]),
        (status = 404, description = "Backend without geosearch support", body = Error)
    ),
    tags = ["extended"],
    security([])
)]
#[get("/api/apartments/nearby")]
pub async fn nearby(
    state: web::Data<HttpState>,
    params: web::Query<NearbyParams>,
) -> ApiResult<web::Json<Vec<NearbyApartment>>> {
    let port = extended(&state)?;
    let radius = params.radius_km.unwrap_or(5.0);
    let listings = port.nearby_apartments(params.lat, params.lon, radius).await?;
    Ok(web::Json(listings))
}

/// Store geocoordinates on an address. Administrator only.
#[utoipa::path(
    post,
    path = "/api/locations/{id}/coordinates",
    params(("id" = String, Path, description = "Address identifier")),
    request_body = CoordinatesRequest,
    responses(
        (status = 204, description = "Coordinates stored"),
        (status = 404, description = "No such address or unsupported backend", body = Error)
    ),
    tags = ["extended"]
)]
#[post("/api/locations/{id}/coordinates")]
pub async fn set_coordinates(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<CoordinatesRequest>,
) -> ApiResult<actix_web::HttpResponse> {
    require_admin(&session, &state).await?;
    let port = extended(&state)?;
    let id = LocationId::new(path.into_inner());
    if !port.set_coordinates(&id, payload.lat, payload.lon).await? {
        return Err(Error::not_found("no such address"));
    }
    Ok(actix_web::HttpResponse::NoContent().finish())
}

/// Percentile/aggregate figures over the whole catalogue. Administrator
/// only.
#[utoipa::path(
    get,
    path = "/api/stats/apartments",
    responses(
        (status = 200, description = "Catalogue analytics", body = ListingAnalytics),
        (status = 404, description = "Backend without analytics support", body = Error)
    ),
    tags = ["extended"]
)]
#[get("/api/stats/apartments")]
pub async fn analytics(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<ListingAnalytics>> {
    require_admin(&session, &state).await?;
    let port = extended(&state)?;
    Ok(web::Json(port.listing_analytics().await?))
}

/// Per-owner activity ranking. Administrator only.
#[utoipa::path(
    get,
    path = "/api/stats/user-activity",
    responses(
        (status = 200, description = "Owner activity", body = [OwnerActivity]),
        (status = 404, description = "Backend without analytics support", body = Error)
    ),
    tags = ["extended"]
)]
#[get("/api/stats/user-activity")]
pub async fn owner_activity(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<OwnerActivity>>> {
    require_admin(&session, &state).await?;
    let port = extended(&state)?;
    Ok(web::Json(port.owner_activity().await?))
}

//! Search and statistics endpoints.

use actix_web::{get, web};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::ports::{SearchQuery, SearchSort, Viewer};
use crate::domain::{Apartment, CityStats, Error};

use super::ApiResult;
use super::auth::{current_user, require_admin};
use super::session::SessionContext;
use super::state::HttpState;

/// Query string accepted by the search endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Free-text query over title and description.
    pub query: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Case-insensitive city substring.
    pub city: Option<String>,
    /// `price_asc`, `price_desc`, `newest`, or `oldest`.
    pub sort_by: Option<String>,
}

impl SearchParams {
    fn into_query(self) -> Result<SearchQuery, Error> {
        let sort = match self.sort_by.as_deref().filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(SearchSort::parse(raw).ok_or_else(|| {
                Error::invalid_request(format!("unknown sort order: {raw}"))
            })?),
            None => None,
        };
        Ok(SearchQuery {
            text: self.query,
            min_price: self.min_price,
            max_price: self.max_price,
            city: self.city,
            sort,
        })
    }
}

/// Search visible listings.
#[utoipa::path(
    get,
    path = "/api/apartments/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching listings", body = [Apartment]),
        (status = 400, description = "Invalid request", body = Error)
    ),
    tags = ["search"],
    security([])
)]
#[get("/api/apartments/search")]
pub async fn search(
    state: web::Data<HttpState>,
    session: SessionContext,
    params: web::Query<SearchParams>,
) -> ApiResult<web::Json<Vec<Apartment>>> {
    let viewer = Viewer::for_user(current_user(&session, &state).await?.as_ref());
    let query = params.into_inner().into_query()?;
    let hits = state.listings.search(&query, &viewer).await?;
    Ok(web::Json(hits))
}

/// Approved-listing distribution by city.
#[utoipa::path(
    get,
    path = "/api/stats/city-distribution",
    responses(
        (status = 200, description = "Per-city counts", body = [CityStats]),
        (status = 403, description = "Not an administrator", body = Error)
    ),
    tags = ["search"]
)]
#[get("/api/stats/city-distribution")]
pub async fn city_distribution(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<CityStats>>> {
    require_admin(&session, &state).await?;
    let stats = state.listings.city_distribution().await?;
    Ok(web::Json(stats))
}

//! OpenAPI document served by Swagger UI in debug builds.

use utoipa::OpenApi;

use crate::domain::ports::{ListingAnalytics, NearbyApartment, OwnerActivity};
use crate::domain::{
    Apartment, CityStats, Error, ErrorCode, ListingStatus, Location, LocationKey, SystemStats,
    User,
};
use crate::inbound::http::accounts::{LoginRequest, ProfileResponse, RegisterRequest};
use crate::inbound::http::admin::{AdminPanel, ModerateRequest};
use crate::inbound::http::extensions::CoordinatesRequest;
use crate::inbound::http::listings::{
    CreateListingRequest, LocationRequest, UpdateListingRequest,
};

/// Public OpenAPI surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::inbound::http::listings::home,
        crate::inbound::http::listings::list,
        crate::inbound::http::listings::create,
        crate::inbound::http::listings::get_one,
        crate::inbound::http::listings::update,
        crate::inbound::http::listings::remove,
        crate::inbound::http::listings::observe,
        crate::inbound::http::listings::unobserve,
        crate::inbound::http::accounts::register,
        crate::inbound::http::accounts::login,
        crate::inbound::http::accounts::logout,
        crate::inbound::http::accounts::profile,
        crate::inbound::http::accounts::observations,
        crate::inbound::http::admin::panel,
        crate::inbound::http::admin::toggle_user_status,
        crate::inbound::http::admin::moderate,
        crate::inbound::http::search::search,
        crate::inbound::http::search::city_distribution,
        crate::inbound::http::extensions::by_features,
        crate::inbound::http::extensions::update_features,
        crate::inbound::http::extensions::nearby,
        crate::inbound::http::extensions::set_coordinates,
        crate::inbound::http::extensions::analytics,
        crate::inbound::http::extensions::owner_activity,
    ),
    components(schemas(
        Apartment,
        ListingStatus,
        Location,
        LocationKey,
        User,
        SystemStats,
        CityStats,
        Error,
        ErrorCode,
        ListingAnalytics,
        NearbyApartment,
        OwnerActivity,
        RegisterRequest,
        LoginRequest,
        ProfileResponse,
        AdminPanel,
        ModerateRequest,
        CreateListingRequest,
        UpdateListingRequest,
        LocationRequest,
        CoordinatesRequest,
    )),
    tags(
        (name = "listings", description = "Catalogue and listing CRUD"),
        (name = "accounts", description = "Registration, login, profile"),
        (name = "admin", description = "Moderation and user management"),
        (name = "search", description = "Search and statistics"),
        (name = "extended", description = "Full-text/JSONB extras")
    )
)]
pub struct ApiDoc;

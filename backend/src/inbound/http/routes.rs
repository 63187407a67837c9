//! Route registration for the HTTP surface.

use actix_web::web;

use super::{accounts, admin, extensions, listings, search};

/// Register every handler on the service config.
///
/// Registration order matters for overlapping prefixes: the fixed-path
/// routes (`/apartments/`, `/profile/observations`) must precede the
/// parameterised `/apartments/{id}` family.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(listings::home)
        .service(accounts::register)
        .service(accounts::login)
        .service(accounts::logout)
        .service(accounts::observations)
        .service(accounts::profile)
        .service(listings::list)
        .service(listings::create)
        .service(search::search)
        .service(search::city_distribution)
        .service(extensions::by_features)
        .service(extensions::nearby)
        .service(extensions::update_features)
        .service(extensions::set_coordinates)
        .service(extensions::analytics)
        .service(extensions::owner_activity)
        .service(listings::observe)
        .service(listings::unobserve)
        .service(listings::get_one)
        .service(listings::update)
        .service(listings::remove)
        .service(admin::panel)
        .service(admin::toggle_user_status)
        .service(admin::moderate);
}

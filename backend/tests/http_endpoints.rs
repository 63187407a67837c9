//! HTTP surface tests: real handlers, cookie sessions, in-memory store.

use std::sync::Arc;

use actix_web::cookie::{Cookie, Key};
use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use serde_json::{Value, json};

use domivka::domain::UserId;
use domivka::inbound::http::routes;
use domivka::inbound::http::state::HttpState;
use domivka::outbound::memory::MemoryStore;
use domivka::server::session_middleware;

struct TestServer {
    store: Arc<MemoryStore>,
}

fn test_state(store: Arc<MemoryStore>) -> HttpState {
    HttpState::new(store)
}

macro_rules! init_app {
    ($store:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(test_state($store.clone())))
                .wrap(session_middleware(Key::generate(), false))
                .configure(routes::configure),
        )
        .await
    };
}

impl TestServer {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
        }
    }
}

fn register_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": "hunter2",
        "firstName": "Test",
        "lastName": "User",
        "phone": "0971112233",
    })
}

async fn register<S, B>(app: &S, email: &str) -> Value
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse<B>,
            Error = actix_web::Error,
        >,
    B: actix_web::body::MessageBody,
    B::Error: std::fmt::Debug,
{
    let res = test::call_service(
        app,
        test::TestRequest::post()
            .uri("/register/")
            .set_json(register_body(email))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    test::read_body_json(res).await
}

async fn login<S, B>(app: &S, email: &str) -> Cookie<'static>
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse<B>,
            Error = actix_web::Error,
        >,
    B: actix_web::body::MessageBody,
{
    let res = test::call_service(
        app,
        test::TestRequest::post()
            .uri("/login/")
            .set_json(json!({ "email": email, "password": "hunter2" }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    res.response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .expect("session cookie set")
        .into_owned()
}

fn listing_body() -> Value {
    json!({
        "title": "Two-room flat",
        "description": "Bright, renovated, near the metro",
        "price": 850.0,
        "location": { "city": "Kyiv", "street": "Khreshchatyk", "houseNumber": "10" },
    })
}

#[actix_web::test]
async fn register_login_create_moderate_list_round_trip() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    // Owner registers, logs in, creates a listing.
    register(&app, "owner@example.com").await;
    let owner_cookie = login(&app, "owner@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/apartments/")
            .cookie(owner_cookie.clone())
            .set_json(listing_body())
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(res).await;
    assert_eq!(created["status"], "pending");
    let listing_id = created["id"].as_str().expect("listing id").to_owned();

    // Anonymous catalogue is empty while pending.
    let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let catalogue: Value = test::read_body_json(res).await;
    assert_eq!(catalogue.as_array().map(Vec::len), Some(0));

    // Promote a second account to admin and approve the listing.
    let admin: Value = register(&app, "admin@example.com").await;
    server
        .store
        .promote_to_admin(&UserId::new(admin["id"].as_str().expect("admin id")));
    let admin_cookie = login(&app, "admin@example.com").await;

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/admin/apartments/{listing_id}/moderate"))
            .cookie(admin_cookie.clone())
            .set_json(json!({ "status": "approved" }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let moderated: Value = test::read_body_json(res).await;
    assert_eq!(moderated["status"], "approved");
    assert!(moderated["moderatedBy"].is_string());

    // The anonymous catalogue now shows exactly that listing.
    let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let catalogue: Value = test::read_body_json(res).await;
    let items = catalogue.as_array().expect("array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], listing_id.as_str());
}

#[actix_web::test]
async fn duplicate_email_registration_conflicts() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    register(&app, "owner@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/register/")
            .set_json(register_body("owner@example.com"))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["code"], "duplicate_key");
}

#[actix_web::test]
async fn wrong_password_is_unauthorized() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    register(&app, "owner@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/login/")
            .set_json(json!({ "email": "owner@example.com", "password": "wrong" }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn admin_surface_is_fenced_off() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    // Unauthenticated: 401.
    let res = test::call_service(&app, test::TestRequest::get().uri("/admin/").to_request()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Authenticated non-admin: 403.
    register(&app, "user@example.com").await;
    let cookie = login(&app, "user@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/admin/").cookie(cookie.clone()).to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/stats/city-distribution")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn moderation_rejects_pending_as_a_target() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    register(&app, "owner@example.com").await;
    let owner_cookie = login(&app, "owner@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/apartments/")
            .cookie(owner_cookie)
            .set_json(listing_body())
            .to_request(),
    )
    .await;
    let created: Value = test::read_body_json(res).await;
    let listing_id = created["id"].as_str().expect("listing id").to_owned();

    let admin: Value = register(&app, "admin@example.com").await;
    server
        .store
        .promote_to_admin(&UserId::new(admin["id"].as_str().expect("admin id")));
    let admin_cookie = login(&app, "admin@example.com").await;

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/admin/apartments/{listing_id}/moderate"))
            .cookie(admin_cookie)
            .set_json(json!({ "status": "pending" }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn only_the_owner_or_an_admin_may_delete() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    register(&app, "owner@example.com").await;
    let owner_cookie = login(&app, "owner@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/apartments/")
            .cookie(owner_cookie.clone())
            .set_json(listing_body())
            .to_request(),
    )
    .await;
    let created: Value = test::read_body_json(res).await;
    let listing_id = created["id"].as_str().expect("listing id").to_owned();

    register(&app, "stranger@example.com").await;
    let stranger_cookie = login(&app, "stranger@example.com").await;
    let res = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/apartments/{listing_id}"))
            .cookie(stranger_cookie)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/apartments/{listing_id}"))
            .cookie(owner_cookie)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn extended_endpoints_answer_404_without_the_extended_backend() {
    let server = TestServer::new();
    let app = init_app!(server.store);

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/apartments/nearby?lat=50.45&lon=30.52")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

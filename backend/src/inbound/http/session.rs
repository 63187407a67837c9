//! Session helpers to keep HTTP handlers free of framework-specific logic.
//!
//! The signed session cookie carries the authenticated account's email as
//! its subject; an absent or unreadable subject means unauthenticated. A
//! thin wrapper around Actix sessions keeps handlers on domain-friendly
//! operations only.

use actix_session::Session;
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures_util::future::LocalBoxFuture;

use crate::domain::Error;

pub(crate) const SUBJECT_KEY: &str = "subject";

/// Newtype wrapper that exposes higher-level session operations.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    /// Construct a new wrapper from the underlying Actix session.
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// Persist the authenticated account's email in the session cookie.
    pub fn persist_subject(&self, email: &str) -> Result<(), Error> {
        self.0
            .insert(SUBJECT_KEY, email)
            .map_err(|error| Error::internal(format!("failed to persist session: {error}")))
    }

    /// Fetch the session subject, if present.
    pub fn subject(&self) -> Result<Option<String>, Error> {
        self.0
            .get::<String>(SUBJECT_KEY)
            .map_err(|error| Error::internal(format!("failed to read session: {error}")))
    }

    /// Drop all session state, ending the login.
    pub fn purge(&self) {
        self.0.purge();
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Session::from_request(req, payload);
        Box::pin(async move { fut.await.map(SessionContext::new) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_session::SessionMiddleware;
    use actix_session::storage::CookieSessionStore;
    use actix_web::cookie::Key;
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpResponse, test, web};

    #[actix_web::test]
    async fn round_trips_the_subject() {
        let key = Key::generate();
        let app = test::init_service(
            App::new()
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), key)
                        .cookie_secure(false)
                        .build(),
                )
                .route(
                    "/set",
                    web::get().to(|session: SessionContext| async move {
                        session.persist_subject("ada@example.com")?;
                        Ok::<_, Error>(HttpResponse::Ok())
                    }),
                )
                .route(
                    "/get",
                    web::get().to(|session: SessionContext| async move {
                        let subject = session
                            .subject()?
                            .ok_or_else(|| Error::unauthorized("login required"))?;
                        Ok::<_, Error>(HttpResponse::Ok().body(subject))
                    }),
                ),
        )
        .await;

        let set_res =
            test::call_service(&app, test::TestRequest::get().uri("/set").to_request()).await;
        assert_eq!(set_res.status(), StatusCode::OK);
        let cookie = set_res
            .response()
            .cookies()
            .next()
            .expect("session cookie set")
            .into_owned();

        let get_res = test::call_service(
            &app,
            test::TestRequest::get().uri("/get").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(get_res.status(), StatusCode::OK);
        let body = test::read_body(get_res).await;
        assert_eq!(body, "ada@example.com");

        let anonymous =
            test::call_service(&app, test::TestRequest::get().uri("/get").to_request()).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }
}

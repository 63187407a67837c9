//! HTTP server assembly.

mod config;

pub use config::{AppConfig, BackendConfig, ConfigError, StoreHandles};

use actix_session::SessionMiddleware;
use actix_session::storage::CookieSessionStore;
use actix_web::cookie::{Key, SameSite};
use actix_web::{App, HttpServer, web};
use tracing::{info, warn};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

use crate::inbound::http::routes;
use crate::inbound::http::state::HttpState;
use crate::middleware::RequestLog;

/// Load the session signing key, falling back to an ephemeral key only in
/// debug builds or when explicitly allowed.
pub fn load_session_key(key_path: &str) -> std::io::Result<Key> {
    match std::fs::read(key_path) {
        Ok(bytes) => Ok(Key::derive_from(&bytes)),
        Err(e) => {
            let allow_dev = std::env::var("SESSION_ALLOW_EPHEMERAL").ok().as_deref() == Some("1");
            if cfg!(debug_assertions) || allow_dev {
                warn!(path = %key_path, error = %e, "using temporary session key (dev only)");
                Ok(Key::generate())
            } else {
                Err(std::io::Error::other(format!(
                    "failed to read session key at {key_path}: {e}"
                )))
            }
        }
    }
}

/// Build the session middleware shared by the server and tests.
pub fn session_middleware(
    key: Key,
    cookie_secure: bool,
) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        .build()
}

/// Connect the configured backend and serve until shutdown.
pub async fn run(config: AppConfig) -> std::io::Result<()> {
    let key = load_session_key(&config.session_key_file)?;

    let handles = config
        .backend
        .connect()
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    let mut state = HttpState::new(handles.store);
    if let Some(extended) = handles.extended {
        state = state.with_extended(extended);
    }

    info!(addr = %config.bind_addr, "starting HTTP server");
    let cookie_secure = config.cookie_secure;
    HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(session_middleware(key.clone(), cookie_secure))
            .wrap(RequestLog)
            .configure(routes::configure);

        #[cfg(debug_assertions)]
        let app = app.service(
            SwaggerUi::new("/docs/{_:.*}")
                .url("/api-docs/openapi.json", crate::ApiDoc::openapi()),
        );

        app
    })
    .bind(config.bind_addr)?
    .run()
    .await
}

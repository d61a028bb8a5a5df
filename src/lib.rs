//! # userctl: Session-Authenticated User Management
//!
//! `userctl` is a multi-tenant user-management backend built around an
//! opaque-session authentication core. It issues session tokens after
//! password verification, protects state-changing requests with a CSRF
//! double-submit token, and gates resource access by ownership and admin
//! role.
//!
//! ## Overview
//!
//! Browser clients log in with email and password and receive two
//! credentials: a session token in an HttpOnly cookie and a derived CSRF
//! token in the `x-csrf-token` response header. Every authenticated
//! request must present both; the CSRF token proves the caller can read
//! response headers, which cookie-only cross-site requests cannot.
//!
//! Session tokens are opaque `prefix:random` strings stored in a
//! key-value store with per-key expiry. Login sessions embed the user id
//! in their prefix (`user:<id>:<random>`) and slide their expiry on every
//! read; confirmation sessions (`<email>:<random>`) back the password
//! reset and registration flows with a fixed one-hour deadline.
//!
//! ### Request Flow
//!
//! Each inbound request is wrapped in a database transaction by the
//! [`db::transaction`] middleware. The authentication extractor then
//! validates the session/CSRF pair and resolves the caller to a user row
//! inside that same transaction; authorization guards layer on top
//! (authenticated → admin → owner-or-admin). The transaction commits when
//! the handler produces a non-server-error response and rolls back
//! otherwise, and session invalidations queued by handlers are applied
//! only after a successful commit so the session store stays consistent
//! with the relational state.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) exposes authentication routes
//! (`/authentication/*`) and RESTful user management (`/users`). The
//! **authentication layer** ([`auth`]) owns the session store, the CSRF
//! signer, password hashing and the request guards. The **database
//! layer** ([`db`]) uses the repository pattern over sqlx/PostgreSQL and
//! hosts the per-request transaction wrapper.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use userctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = userctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     userctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
mod openapi;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::{
    auth::{
        csrf::{self, CsrfSigner},
        password,
        store::{RedisSessionBackend, SessionStore},
    },
    config::{CorsOrigin, StartupConfig},
    db::{
        handlers::{Repository as _, Users},
        models::users::UserCreateDBRequest,
        transaction::transaction_middleware,
    },
    openapi::ApiDoc,
};

pub use config::Config;
pub use types::{Operation, UserId};

/// Application state shared across all request handlers.
///
/// Immutable after startup: the store clients and the CSRF key are
/// constructed once and injected everywhere, never reached through
/// globals.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub sessions: SessionStore,
    pub csrf: CsrfSigner,
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates the user on first startup, refreshes the password
/// on later ones when one is configured.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> Result<UserId, anyhow::Error> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash_password(pwd).map_err(|e| anyhow::anyhow!("failed to hash admin password: {e}"))?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing) = user_repo.get_user_by_email(email).await? {
        if let Some(password_hash) = password_hash {
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE email = $2")
                .bind(password_hash)
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = user_repo
        .create(&UserCreateDBRequest {
            name: email.to_string(),
            email: email.to_string(),
            is_admin: true,
            password_hash,
        })
        .await?;

    tx.commit().await?;
    info!("created initial admin user {}", created.id);
    Ok(created.id)
}

/// Retry an async connect attempt with exponential backoff.
///
/// Gives up once the next backoff would overrun the configured deadline;
/// the caller treats that as a fatal startup condition.
async fn connect_with_retry<T, F, Fut>(what: &str, startup: &StartupConfig, mut attempt: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let deadline = Instant::now() + startup.connect_deadline;
    let mut backoff = Duration::from_millis(startup.backoff_ms);

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if Instant::now() + backoff >= deadline {
                    return Err(e.context(format!("could not connect to {what}")));
                }
                debug!("connecting to {what} failed, retrying in {backoff:?}: {e:#}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * startup.backoff_factor as u32).min(Duration::from_millis(startup.max_backoff_ms));
            }
        }
    }
}

/// Connect to PostgreSQL, run migrations and bootstrap the admin user.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool = connect_with_retry("the database", &config.startup, || async {
        debug!("Connecting to the database...");
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
            .connect(&config.database.url)
            .await
            .map_err(anyhow::Error::from)
    })
    .await?;

    migrator().run(&pool).await?;

    create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool).await?;

    Ok(pool)
}

/// Connect to the session store and probe it with a round trip.
async fn setup_session_store(config: &Config) -> anyhow::Result<SessionStore> {
    connect_with_retry("the session store", &config.startup, || async {
        debug!("Connecting to the session store...");
        let backend = RedisSessionBackend::connect(&config.session_store.url).await?;
        let store = SessionStore::new(Arc::new(backend), config);
        store.check_connectivity().await?;
        Ok(store)
    })
    .await
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let mut origins = Vec::new();
    for origin in &cors_config.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut exposed = Vec::new();
    for name in &cors_config.exposed_headers {
        exposed.push(name.parse::<axum::http::HeaderName>()?);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(exposed);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Every route, including health, runs inside the per-request transaction
/// wrapper; CORS and tracing wrap the whole router.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .route("/authentication/password-resets", post(api::handlers::confirmation::request_password_reset))
        .route(
            "/authentication/password-resets/confirm",
            post(api::handlers::confirmation::confirm_password_reset),
        )
        .route("/authentication/registrations", post(api::handlers::confirmation::request_registration))
        .route(
            "/authentication/registrations/confirm",
            post(api::handlers::confirmation::confirm_registration),
        );

    let user_routes = Router::new()
        .route("/users", get(api::handlers::users::list_users).post(api::handlers::users::create_user))
        .route(
            "/users/{id}",
            get(api::handlers::users::get_user)
                .patch(api::handlers::users::update_user)
                .delete(api::handlers::users::delete_user),
        );

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .merge(user_routes)
        .layer(from_fn_with_state(state.clone(), transaction_middleware))
        .with_state(state.clone())
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"));

    let cors_layer = create_cors_layer(&state.config)?;
    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the stores (with
///    bounded-backoff retry, fatal on exhaustion), runs migrations and
///    bootstraps the admin user
/// 2. **Serve**: [`Application::serve`] binds the listener and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting userctl with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let sessions = setup_session_store(&config).await?;

        let secret = match &config.secret_key {
            Some(secret) => secret.clone(),
            None => {
                warn!("no secret_key configured; generating an ephemeral one - sessions will not survive a restart");
                csrf::generate_secret()
            }
        };

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .sessions(sessions)
            .csrf(CsrfSigner::new(&secret))
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("userctl listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

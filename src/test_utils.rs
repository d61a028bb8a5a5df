//! Shared helpers for tests: config/state/app factories, user fixtures
//! and session credential plumbing.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use sqlx::PgPool;

use crate::{
    AppState, build_router,
    auth::{
        csrf::CsrfSigner,
        password,
        store::{InMemorySessionBackend, SessionStore},
    },
    config::{Config, EmailTransportConfig},
    db::{
        handlers::{Repository as _, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
};

/// Config for tests: registration open, known secret, file email transport
/// into the temp dir.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.secret_key = Some("test-secret-key-for-csrf".to_string());
    config.auth.allow_registration = true;
    config.email.transport = EmailTransportConfig::File {
        path: std::env::temp_dir().join("userctl-test-emails").to_string_lossy().into_owned(),
    };
    config
}

/// App state over an in-memory session backend.
pub fn create_test_state(pool: PgPool) -> AppState {
    create_test_state_with_config(pool, create_test_config())
}

pub fn create_test_state_with_config(pool: PgPool, config: Config) -> AppState {
    let sessions = SessionStore::new(Arc::new(InMemorySessionBackend::new()), &config);
    let csrf = CsrfSigner::new(config.secret_key.as_deref().unwrap_or("test-secret-key-for-csrf"));

    AppState::builder().db(pool).config(config).sessions(sessions).csrf(csrf).build()
}

/// Full router as a test server.
pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_state(pool).await.0
}

/// Full router plus the state, for tests that inspect the session store.
pub async fn create_test_app_with_state(pool: PgPool) -> (TestServer, AppState) {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> (TestServer, AppState) {
    let state = create_test_state_with_config(pool, config);
    let server = TestServer::new(build_router(&state).expect("failed to build router")).expect("failed to create test server");
    (server, state)
}

/// Insert a user straight into the database with a real password hash.
pub async fn insert_user(pool: &PgPool, email: &str, password: &str, is_admin: bool) -> UserDBResponse {
    let password_hash = password::hash_password(password).expect("failed to hash test password");
    let name = email.split('@').next().unwrap_or("user").to_string();

    let mut conn = pool.acquire().await.expect("failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            name,
            email: email.to_string(),
            is_admin,
            password_hash: Some(password_hash),
        })
        .await
        .expect("failed to insert test user")
}

/// The credential pair a successful login hands to a browser.
pub struct SessionCredentials {
    pub token: String,
    pub csrf: String,
}

/// Log in through the API and capture the session cookie + CSRF header.
pub async fn login_session(server: &TestServer, email: &str, password: &str) -> SessionCredentials {
    let response = server
        .post("/authentication/login")
        .json(&serde_json::json!({"email": email, "password": password}))
        .await;
    response.assert_status_ok();

    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("login must set the session cookie")
        .to_str()
        .unwrap();
    let token = cookie
        .split_once('=')
        .expect("cookie has a value")
        .1
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let csrf = response
        .headers()
        .get("x-csrf-token")
        .expect("login must return the CSRF header")
        .to_str()
        .unwrap()
        .to_string();

    SessionCredentials { token, csrf }
}

/// Cookie header pair for a request authenticated with `creds`.
pub fn cookie_header(creds: &SessionCredentials) -> (HeaderName, HeaderValue) {
    (
        header::COOKIE,
        HeaderValue::from_str(&format!("session_id={}", creds.token)).expect("valid cookie value"),
    )
}

/// CSRF header pair for a request authenticated with `creds`.
pub fn csrf_header(creds: &SessionCredentials) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-csrf-token"),
        HeaderValue::from_str(&creds.csrf).expect("valid csrf value"),
    )
}

//! Login and logout handlers.

use axum::{extract::State, http::HeaderMap, response::Json};

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, AuthSuccessResponse, LoginRequest, LoginResponse, LogoutResponse},
        users::UserResponse,
    },
    auth::{password, store::SessionKind, token, utils},
    db::{
        handlers::Users,
        transaction::{self, DbTransaction},
    },
    errors::Error,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful; session cookie set, CSRF token in x-csrf-token header", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    tx: DbTransaction,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<LoginResponse, Error> {
    let user = {
        let mut guard = tx.lock().await;
        let conn = transaction::connection(&mut guard)?;
        Users::new(conn).get_user_by_email(&request.email).await?
    };

    // Same response for unknown email and wrong password
    let user = user.ok_or_else(invalid_credentials)?;
    let password_hash = user.password_hash.as_ref().ok_or_else(invalid_credentials)?;

    // Verify password on a blocking thread to avoid blocking the async runtime
    let password = request.password.clone();
    let hash = password_hash.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(invalid_credentials());
    }

    // A login with an existing session replaces it. The old token may race
    // an in-flight request; that request fails cleanly as logged-out.
    if let Some(old_token) = utils::session_cookie(&headers, &state.config.auth.session.cookie_name) {
        state.sessions.delete(&[old_token]).await?;
    }

    let session_token = state
        .sessions
        .create(&token::login_prefix(user.id), "", SessionKind::Login)
        .await?;
    let csrf_token = state.csrf.sign(&session_token);
    let cookie = utils::session_cookie_header(&session_token, &state.config);

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: UserResponse::from(user),
            message: "Login successful".to_string(),
        },
        cookie,
        csrf_token,
    })
}

/// Logout (delete session, clear cookie)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<LogoutResponse, Error> {
    if let Some(token) = utils::session_cookie(&headers, &state.config.auth.session.cookie_name) {
        state.sessions.delete(&[token]).await?;
    }

    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie: utils::clear_session_cookie_header(&state.config),
    })
}

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

//! Confirmation-session flows: password reset and email registration.
//!
//! Both flows bind an email address to a short-lived confirmation session
//! (`<email>:<random>`, 1 hour, no renewal on read). Requesting a flow is
//! enumeration-resistant: the response is identical whether or not the
//! address exists. A pending confirmation for the same address rate-limits
//! further requests until it expires.

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::warn;

use crate::{
    AppState,
    api::models::{
        auth::{ConfirmationRequest, ConfirmationResponse, PasswordResetConfirmRequest, RegistrationConfirmRequest},
        users::UserResponse,
    },
    auth::{password, store::SessionKind, token},
    db::{
        handlers::{Repository as _, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
        transaction::{self, DbTransaction, SessionCleanup},
    },
    email::EmailService,
    errors::Error,
    types::UserId,
};

/// Request password reset instructions by email
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = ConfirmationRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Reset instructions sent if the account exists", body = ConfirmationResponse),
        (status = 422, description = "Invalid email address"),
        (status = 429, description = "A reset for this address is already pending"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    tx: DbTransaction,
    Json(request): Json<ConfirmationRequest>,
) -> Result<Json<ConfirmationResponse>, Error> {
    if !token::is_valid_email(&request.email) {
        return Err(Error::Validation {
            message: "Invalid email address".to_string(),
        });
    }
    ensure_no_pending_confirmation(&state, &request.email).await?;

    let user = {
        let mut guard = tx.lock().await;
        let conn = transaction::connection(&mut guard)?;
        Users::new(conn).get_user_by_email(&request.email).await?
    };

    // Identical response whether or not the account exists
    match user {
        Some(user) => {
            let session_token = state
                .sessions
                .create(&request.email, &user.id.to_string(), SessionKind::Confirmation)
                .await?;

            let email_service = EmailService::new(&state.config)?;
            email_service
                .send_password_reset_email(&user.email, Some(&user.name), &session_token)
                .await?;
        }
        None => {
            warn!("password reset requested for unknown email");
        }
    }

    Ok(Json(confirmation_sent()))
}

/// Complete a password reset with a confirmation session token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password has been reset", body = ConfirmationResponse),
        (status = 404, description = "Unknown or expired confirmation session"),
        (status = 422, description = "Malformed token or password policy violation"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    tx: DbTransaction,
    cleanup: SessionCleanup,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<ConfirmationResponse>, Error> {
    let email = confirm_email_session(&state, &request.session_id).await?;
    password::validate_password_policy(&request.password, &state.config.auth.password)?;

    // A reset session is always created with the user id as payload
    let payload = state.sessions.read(&request.session_id, SessionKind::Confirmation).await?;
    let user_id: UserId = payload
        .filter(|p| !p.is_empty())
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| {
            tracing::error!("confirmation session for {email} is missing its user id payload");
            Error::Internal {
                operation: "read confirmation session payload".to_string(),
            }
        })?;

    let password_hash = hash_on_blocking_thread(request.password.clone()).await?;

    {
        let mut guard = tx.lock().await;
        let conn = transaction::connection(&mut guard)?;
        Users::new(conn)
            .update(
                user_id,
                &UserUpdateDBRequest {
                    name: None,
                    password_hash: Some(password_hash),
                    is_admin: None,
                },
            )
            .await?;
    }

    // Consume the confirmation session and revoke standing logins once the
    // password change commits; a rolled-back reset keeps both intact
    cleanup.delete_token(request.session_id.clone());
    cleanup.delete_matching(token::login_pattern(user_id));

    Ok(Json(ConfirmationResponse {
        message: "Password has been reset successfully".to_string(),
    }))
}

/// Request registration instructions by email
#[utoipa::path(
    post,
    path = "/authentication/registrations",
    request_body = ConfirmationRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Registration instructions sent if the address is free", body = ConfirmationResponse),
        (status = 400, description = "Registration is disabled"),
        (status = 422, description = "Invalid email address"),
        (status = 429, description = "A registration for this address is already pending"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_registration(
    State(state): State<AppState>,
    tx: DbTransaction,
    Json(request): Json<ConfirmationRequest>,
) -> Result<Json<ConfirmationResponse>, Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }
    if !token::is_valid_email(&request.email) {
        return Err(Error::Validation {
            message: "Invalid email address".to_string(),
        });
    }
    ensure_no_pending_confirmation(&state, &request.email).await?;

    let existing = {
        let mut guard = tx.lock().await;
        let conn = transaction::connection(&mut guard)?;
        Users::new(conn).get_user_by_email(&request.email).await?
    };

    // Identical response whether or not the address is taken
    match existing {
        Some(_) => {
            warn!("registration requested for an email that already exists");
        }
        None => {
            let session_token = state.sessions.create(&request.email, "", SessionKind::Confirmation).await?;

            let email_service = EmailService::new(&state.config)?;
            email_service.send_registration_email(&request.email, &session_token).await?;
        }
    }

    Ok(Json(confirmation_sent()))
}

/// Complete registration with a confirmation session token
#[utoipa::path(
    post,
    path = "/authentication/registrations/confirm",
    request_body = RegistrationConfirmRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Registration is disabled"),
        (status = 404, description = "Unknown or expired confirmation session"),
        (status = 409, description = "An account with this email already exists"),
        (status = 422, description = "Malformed token, email mismatch or password policy violation"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_registration(
    State(state): State<AppState>,
    tx: DbTransaction,
    cleanup: SessionCleanup,
    Json(request): Json<RegistrationConfirmRequest>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let email = confirm_email_session(&state, &request.session_id).await?;
    if request.email != email {
        return Err(Error::Validation {
            message: "Email does not match the confirmation session".to_string(),
        });
    }
    password::validate_password_policy(&request.password, &state.config.auth.password)?;

    let password_hash = hash_on_blocking_thread(request.password.clone()).await?;

    let created = {
        let mut guard = tx.lock().await;
        let conn = transaction::connection(&mut guard)?;
        Users::new(conn)
            .create(&UserCreateDBRequest {
                name: request.name,
                email: request.email,
                is_admin: false,
                password_hash: Some(password_hash),
            })
            .await?
    };

    cleanup.delete_token(request.session_id.clone());

    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

/// Validate a presented confirmation token: shape (422), then a plausible
/// email prefix and a live session (404). Returns the email prefix.
async fn confirm_email_session(state: &AppState, session_id: &str) -> Result<String, Error> {
    let email = token::parse_confirmation_token(session_id)?;
    if !token::is_valid_email(email) || !state.sessions.exists(session_id).await? {
        return Err(Error::NotFound {
            resource: "Confirmation session".to_string(),
            id: email.to_string(),
        });
    }
    Ok(email.to_string())
}

/// Rate limit: one pending confirmation session per address.
async fn ensure_no_pending_confirmation(state: &AppState, email: &str) -> Result<(), Error> {
    let pending = state.sessions.keys_matching(&token::confirmation_pattern(email)).await?;
    if !pending.is_empty() {
        return Err(Error::DuplicateRequest {
            resource: format!("confirmation for {email}"),
        });
    }
    Ok(())
}

fn confirmation_sent() -> ConfirmationResponse {
    ConfirmationResponse {
        message: "If this address can receive instructions, an email has been sent.".to_string(),
    }
}

async fn hash_on_blocking_thread(password: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

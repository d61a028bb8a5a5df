//! API request/response models for authentication and confirmation flows.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::models::users::UserResponse;
use crate::auth::CSRF_HEADER;

/// Request to login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

/// Response after successful login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// User information
    pub user: UserResponse,
    /// Success message
    pub message: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// Request to start a password reset or registration confirmation flow
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmationRequest {
    /// Email address the confirmation link is sent to
    pub email: String,
}

/// Response for confirmation flow requests.
///
/// Deliberately identical whether or not anything happened, to resist
/// account enumeration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmationResponse {
    pub message: String,
}

/// Request to complete a password reset with a confirmation session token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetConfirmRequest {
    /// Confirmation session token from the emailed link
    pub session_id: String,
    /// New password
    pub password: String,
}

/// Request to complete registration with a confirmation session token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationConfirmRequest {
    /// Confirmation session token from the emailed link
    pub session_id: String,
    /// Display name
    pub name: String,
    /// Email address; must match the one the token was issued for
    pub email: String,
    /// Password
    pub password: String,
}

// Response models that implement IntoResponse for cleaner handler code
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Structured response for successful login.
///
/// Sets the HttpOnly session cookie and returns the CSRF token in the
/// `x-csrf-token` response header so client script can read and echo it.
pub struct LoginResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
    pub csrf_token: String,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, self.cookie.parse().unwrap());
        headers.insert(CSRF_HEADER, self.csrf_token.parse().unwrap());
        (StatusCode::OK, headers, Json(self.auth_response)).into_response()
    }
}

/// Structured response for logout: clears the session cookie.
pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, self.cookie.parse().unwrap());
        (StatusCode::OK, headers, Json(self.auth_response)).into_response()
    }
}

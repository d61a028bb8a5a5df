//! OpenAPI documentation for the management API.

use utoipa::OpenApi;

use crate::api::{handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login,
        handlers::auth::logout,
        handlers::confirmation::request_password_reset,
        handlers::confirmation::confirm_password_reset,
        handlers::confirmation::request_registration,
        handlers::confirmation::confirm_registration,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::delete_user,
    ),
    components(schemas(
        models::auth::LoginRequest,
        models::auth::AuthResponse,
        models::auth::AuthSuccessResponse,
        models::auth::ConfirmationRequest,
        models::auth::ConfirmationResponse,
        models::auth::PasswordResetConfirmRequest,
        models::auth::RegistrationConfirmRequest,
        models::users::UserCreate,
        models::users::UserUpdate,
        models::users::UserResponse,
    )),
    tags(
        (name = "authentication", description = "Session login, logout and email confirmation flows"),
        (name = "users", description = "User management")
    )
)]
pub struct ApiDoc;

//! User management handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    AppState,
    api::models::users::{ListUsersQuery, UserCreate, UserResponse, UserUpdate},
    auth::{
        current_user::CurrentUser,
        guards::{AdminUser, resolve_target_user},
        password, token,
    },
    db::{
        handlers::{Repository as _, Users, users::UserFilter},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
        transaction::{self, DbTransaction, SessionCleanup},
    },
    errors::Error,
    types::{Operation, UserId},
};

// GET /users - List users (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "List all users (admin only)",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List of users", body = [UserResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(_state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListUsersQuery>,
    tx: DbTransaction,
) -> Result<Json<Vec<UserResponse>>, Error> {
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);

    let mut guard = tx.lock().await;
    let conn = transaction::connection(&mut guard)?;
    let users = Users::new(conn).list(&UserFilter::new(skip, limit)).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

// GET /users/{id} - Get a specific user (self or admin)
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    summary = "Get user",
    description = "Get a specific user by ID (self or admin)",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User information", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - can only view own user data unless admin"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(_state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    tx: DbTransaction,
) -> Result<Json<UserResponse>, Error> {
    let mut guard = tx.lock().await;
    let conn = transaction::connection(&mut guard)?;
    let user = resolve_target_user(conn, &current_user, user_id, Operation::ReadOwn).await?;

    Ok(Json(UserResponse::from(user)))
}

// POST /users - Create user (admin only unless registration is open)
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    description = "Create a new user. Requires an admin session unless self-service registration is enabled.",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created successfully", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 409, description = "An account with this email already exists"),
        (status = 422, description = "Password policy violation"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    current_user: Result<CurrentUser, Error>,
    tx: DbTransaction,
    Json(user_data): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    let admin_caller = matches!(&current_user, Ok(user) if user.is_admin);

    // Closed registration keeps user creation an admin operation
    if !state.config.auth.allow_registration && !admin_caller {
        return Err(match current_user {
            Ok(_) => Error::InsufficientPermissions {
                action: Operation::CreateAll,
                resource: "user accounts".to_string(),
            },
            Err(e) => e,
        });
    }

    password::validate_password_policy(&user_data.password, &state.config.auth.password)?;

    let password_hash = tokio::task::spawn_blocking({
        let password = user_data.password.clone();
        move || password::hash_password(&password)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    let mut guard = tx.lock().await;
    let conn = transaction::connection(&mut guard)?;
    let created = Users::new(conn)
        .create(&UserCreateDBRequest {
            name: user_data.name,
            email: user_data.email,
            // Only admins may mint admins
            is_admin: user_data.is_admin && admin_caller,
            password_hash: Some(password_hash),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

// PATCH /users/{id} - Update user (self or admin)
#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    summary = "Update user",
    description = "Update an existing user (self or admin)",
    params(("id" = uuid::Uuid, Path, description = "User ID to update")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "User updated successfully", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Password policy violation"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    tx: DbTransaction,
    Json(user_data): Json<UserUpdate>,
) -> Result<Json<UserResponse>, Error> {
    // Only admins may grant or revoke the admin flag
    if user_data.is_admin.is_some() && !current_user.is_admin {
        return Err(Error::InsufficientPermissions {
            action: Operation::UpdateOwn,
            resource: "the admin flag".to_string(),
        });
    }

    let password_hash = match &user_data.password {
        Some(password) => {
            password::validate_password_policy(password, &state.config.auth.password)?;
            let password = password.clone();
            Some(
                tokio::task::spawn_blocking(move || password::hash_password(&password))
                    .await
                    .map_err(|e| Error::Internal {
                        operation: format!("spawn password hashing task: {e}"),
                    })??,
            )
        }
        None => None,
    };

    let mut guard = tx.lock().await;
    let conn = transaction::connection(&mut guard)?;
    resolve_target_user(conn, &current_user, user_id, Operation::UpdateOwn).await?;

    let updated = Users::new(conn)
        .update(
            user_id,
            &UserUpdateDBRequest {
                name: user_data.name,
                password_hash,
                is_admin: user_data.is_admin,
            },
        )
        .await?;

    Ok(Json(UserResponse::from(updated)))
}

// DELETE /users/{id} - Delete user (self or admin)
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    summary = "Delete user",
    description = "Delete a user (self or admin). Invalidates the user's sessions once the deletion commits.",
    params(("id" = uuid::Uuid, Path, description = "User ID to delete")),
    responses(
        (status = 204, description = "User deleted successfully"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(_state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    tx: DbTransaction,
    cleanup: SessionCleanup,
) -> Result<StatusCode, Error> {
    {
        let mut guard = tx.lock().await;
        let conn = transaction::connection(&mut guard)?;
        resolve_target_user(conn, &current_user, user_id, Operation::DeleteOwn).await?;
        Users::new(conn).delete(user_id).await?;
    }

    // Sessions fall with the row, but only after the deletion commits: a
    // rolled-back delete must not strand a live user without sessions
    cleanup.delete_matching(token::login_pattern(user_id));

    Ok(StatusCode::NO_CONTENT)
}

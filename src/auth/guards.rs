//! Layered authorization checks applied in front of handlers.
//!
//! Guards compose left-to-right and short-circuit on the first rejection:
//! authenticated ([`CurrentUser`]) → admin ([`AdminUser`]) →
//! owner-or-admin ([`resolve_target_user`]). Target lookups run only after
//! the entitlement check passes, so callers that are allowed to ask get a
//! 404 for a missing target instead of a 403.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgConnection;

use crate::{
    AppState,
    auth::current_user::CurrentUser,
    db::{
        handlers::{Repository as _, Users},
        models::users::UserDBResponse,
    },
    errors::{Error, Result},
    types::{Operation, UserId},
};

/// Extractor requiring an authenticated admin.
///
/// Rejects with 403 once the caller is known; an unauthenticated caller
/// still gets the 401 from the inner extractor.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(Error::InsufficientPermissions {
                action: Operation::ReadAll,
                resource: "user accounts".to_string(),
            });
        }
        Ok(AdminUser(user))
    }
}

/// Owner-or-admin check followed by the target lookup.
///
/// - caller is the target → allowed regardless of the admin flag
/// - caller is admin → allowed
/// - otherwise → 403
///
/// Only then is the target fetched; absence yields 404.
pub async fn resolve_target_user(
    conn: &mut PgConnection,
    current: &CurrentUser,
    target: UserId,
    action: Operation,
) -> Result<UserDBResponse> {
    if target != current.id && !current.is_admin {
        return Err(Error::InsufficientPermissions {
            action,
            resource: format!("user {target}"),
        });
    }

    Users::new(conn).get_by_id(target).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: target.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::insert_user;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn current(id: UserId, is_admin: bool) -> CurrentUser {
        CurrentUser {
            id,
            name: "caller".to_string(),
            email: "caller@example.com".to_string(),
            is_admin,
        }
    }

    #[sqlx::test]
    async fn test_self_access_allowed_without_admin(pool: PgPool) {
        let user = insert_user(&pool, "self@example.com", "hunter2hunter2", false).await;
        let mut conn = pool.acquire().await.unwrap();

        let resolved = resolve_target_user(&mut conn, &current(user.id, false), user.id, Operation::ReadOwn)
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[sqlx::test]
    async fn test_other_user_forbidden_for_non_admin(pool: PgPool) {
        let target = insert_user(&pool, "target@example.com", "hunter2hunter2", false).await;
        let mut conn = pool.acquire().await.unwrap();

        let err = resolve_target_user(&mut conn, &current(Uuid::new_v4(), false), target.id, Operation::ReadOwn)
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 403);
    }

    #[sqlx::test]
    async fn test_admin_can_access_other_user(pool: PgPool) {
        let target = insert_user(&pool, "admin-target@example.com", "hunter2hunter2", false).await;
        let mut conn = pool.acquire().await.unwrap();

        let resolved = resolve_target_user(&mut conn, &current(Uuid::new_v4(), true), target.id, Operation::ReadOwn)
            .await
            .unwrap();
        assert_eq!(resolved.id, target.id);
    }

    #[sqlx::test]
    async fn test_missing_target_is_404_for_entitled_caller(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let missing = Uuid::new_v4();

        // Admin is entitled to ask, so absence is 404 rather than 403
        let err = resolve_target_user(&mut conn, &current(Uuid::new_v4(), true), missing, Operation::ReadOwn)
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);

        // A non-admin asking for someone else is rejected before the lookup
        let err = resolve_target_user(&mut conn, &current(Uuid::new_v4(), false), missing, Operation::ReadOwn)
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 403);
    }
}

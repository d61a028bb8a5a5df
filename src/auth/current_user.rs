//! Extractor resolving the authenticated user for a request.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use utoipa::ToSchema;

use crate::{
    AppState,
    auth::{CSRF_HEADER, store::SessionKind, token, utils},
    db::{
        handlers::{Repository as _, Users},
        models::users::UserDBResponse,
        transaction::SharedTransaction,
    },
    errors::{Error, Result},
    types::UserId,
};

/// The authenticated caller, resolved once per request.
///
/// Immutable for the rest of the request once extracted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<UserDBResponse> for CurrentUser {
    fn from(user: UserDBResponse) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    /// Resolve the session cookie + CSRF header pair to a user.
    ///
    /// Terminal outcomes are Authenticated or 401; every failure along the
    /// way collapses to the same 401 so the response does not reveal which
    /// check rejected the request.
    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Both credentials must be present
        let token = utils::session_cookie(&parts.headers, &state.config.auth.session.cookie_name).ok_or(Error::Unauthenticated {
            message: None,
        })?;
        let presented_csrf = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or(Error::Unauthenticated { message: None })?;

        // The CSRF token is a pure function of the session token; checking
        // it first avoids a store round trip for forged requests
        if !state.csrf.verify(&token, presented_csrf) {
            trace!("CSRF token mismatch");
            return Err(Error::Unauthenticated { message: None });
        }

        // Subject is embedded in the token prefix
        let Some(user_id) = token::parse_login_token(&token) else {
            trace!("session token does not carry a login subject");
            return Err(Error::Unauthenticated { message: None });
        };

        // The session must still exist; reading renews the idle timeout
        if state.sessions.read(&token, SessionKind::Login).await?.is_none() {
            trace!("session expired or absent");
            return Err(Error::Unauthenticated { message: None });
        }

        // Resolve to a concrete user. A deleted account can still hold a
        // live session; that resolves to 401, not 404.
        let user = lookup_user(parts, state, user_id).await?;
        match user {
            Some(user) => {
                debug!("authenticated user {}", user.id);
                Ok(CurrentUser::from(user))
            }
            None => {
                trace!("session subject no longer exists");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

/// Load the user row, preferring the request transaction when the
/// transaction middleware is installed.
async fn lookup_user(parts: &Parts, state: &AppState, user_id: UserId) -> Result<Option<UserDBResponse>> {
    match parts.extensions.get::<SharedTransaction>() {
        Some(shared) => {
            let mut guard = shared.lock().await;
            let tx = guard.as_mut().ok_or_else(|| Error::Internal {
                operation: "borrow the request transaction".to_string(),
            })?;
            Ok(Users::new(tx).get_by_id(user_id).await?)
        }
        None => {
            let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            Ok(Users::new(&mut conn).get_by_id(user_id).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::store::SessionKind,
        test_utils::{create_test_state, insert_user},
    };
    use axum::http::request::Parts;
    use sqlx::PgPool;

    fn parts_with(cookie: Option<&str>, csrf: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("http://localhost/test");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        if let Some(csrf) = csrf {
            builder = builder.header(CSRF_HEADER, csrf);
        }
        let (parts, _body) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[sqlx::test]
    async fn test_valid_session_resolves_user(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = insert_user(&pool, "resolver@example.com", "hunter2hunter2", false).await;

        let token = state
            .sessions
            .create(&format!("user:{}", user.id), "", SessionKind::Login)
            .await
            .unwrap();
        let csrf = state.csrf.sign(&token);

        let mut parts = parts_with(Some(&format!("session_id={token}")), Some(&csrf));
        let current = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(current.id, user.id);
        assert_eq!(current.email, user.email);
        assert!(!current.is_admin);
    }

    #[sqlx::test]
    async fn test_missing_credentials_are_unauthenticated(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = insert_user(&pool, "missing@example.com", "hunter2hunter2", false).await;
        let token = state
            .sessions
            .create(&format!("user:{}", user.id), "", SessionKind::Login)
            .await
            .unwrap();
        let csrf = state.csrf.sign(&token);

        // No cookie
        let mut parts = parts_with(None, Some(&csrf));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 401);

        // No CSRF header
        let mut parts = parts_with(Some(&format!("session_id={token}")), None);
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 401);
    }

    #[sqlx::test]
    async fn test_wrong_csrf_is_unauthenticated(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = insert_user(&pool, "csrf@example.com", "hunter2hunter2", false).await;
        let token = state
            .sessions
            .create(&format!("user:{}", user.id), "", SessionKind::Login)
            .await
            .unwrap();

        let mut parts = parts_with(Some(&format!("session_id={token}")), Some("wrong-csrf"));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 401);
    }

    #[sqlx::test]
    async fn test_deleted_session_is_unauthenticated(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let user = insert_user(&pool, "gone@example.com", "hunter2hunter2", false).await;
        let token = state
            .sessions
            .create(&format!("user:{}", user.id), "", SessionKind::Login)
            .await
            .unwrap();
        let csrf = state.csrf.sign(&token);

        state.sessions.delete(std::slice::from_ref(&token)).await.unwrap();

        let mut parts = parts_with(Some(&format!("session_id={token}")), Some(&csrf));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 401);
    }

    #[sqlx::test]
    async fn test_session_for_deleted_user_is_unauthenticated(pool: PgPool) {
        let state = create_test_state(pool.clone());

        // Session for a user id that has no row behind it
        let token = state
            .sessions
            .create(&format!("user:{}", uuid::Uuid::new_v4()), "", SessionKind::Login)
            .await
            .unwrap();
        let csrf = state.csrf.sign(&token);

        let mut parts = parts_with(Some(&format!("session_id={token}")), Some(&csrf));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 401);
    }
}

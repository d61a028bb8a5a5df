//! Database request/response models for users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Request to insert a user row.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub password_hash: Option<String>,
}

/// Field-wise update request; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub is_admin: Option<bool>,
}

/// Full user row as returned by the repository.
///
/// Carries the password hash; API models strip it before anything leaves
/// the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDBResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

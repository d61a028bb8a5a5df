//! Authentication and authorization system.
//!
//! This module provides the session/CSRF/authorization core:
//! - Opaque session tokens stored in a key-value store with expiry
//! - CSRF double-submit tokens derived from the session token with HMAC-SHA256
//! - Password hashing and validation
//! - Extractors resolving the authenticated user and gating admin access
//!
//! # Authentication
//!
//! Browser clients authenticate with a session cookie plus a CSRF header:
//! - Users log in via `/authentication/login` with email/password
//! - The session token is stored in a secure, HTTP-only cookie
//! - The CSRF token is returned in the `x-csrf-token` response header so
//!   client script can read and echo it on subsequent requests
//! - Session data is backed by the session store; login sessions renew
//!   their expiry on each read
//!
//! # Authorization
//!
//! Access control is layered: authenticated ([`current_user::CurrentUser`]),
//! admin ([`guards::AdminUser`]), and resource-owner-or-admin
//! ([`guards::resolve_target_user`]). Guards short-circuit on the first
//! rejection; target lookups happen only after authorization passes, so a
//! missing target yields 404 rather than 403.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for the authenticated user in handlers
//! - [`guards`]: Admin and ownership checks applied before handlers run
//! - [`csrf`]: CSRF token signing and verification
//! - [`password`]: Password hashing and verification using Argon2
//! - [`store`]: Session token lifecycle against the key-value store
//! - [`token`]: Session token composition and parsing
//! - [`utils`]: Cookie parsing helpers

pub mod csrf;
pub mod current_user;
pub mod guards;
pub mod password;
pub mod store;
pub mod token;
pub mod utils;

/// Header carrying the CSRF token on authenticated requests, and returned
/// to the client at login time. Deliberately a header rather than a cookie:
/// the CSRF token must be readable by client script while the session token
/// must not be.
pub const CSRF_HEADER: &str = "x-csrf-token";

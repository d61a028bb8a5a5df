//! Password hashing and verification.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::config::PasswordConfig;
use crate::errors::Error;

/// Hash a password using Argon2id with the crate's default parameters.
///
/// The salt and parameters are embedded in the PHC-format hash string.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// Note: Verification uses the parameters embedded in the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse password hash: {e}"),
    })?;

    let argon2 = Argon2::default();
    Ok(argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// Check a candidate password against the configured policy.
///
/// Runs before the password ever reaches the hasher; violations are
/// client errors, not authentication failures.
pub fn validate_password_policy(password: &str, policy: &PasswordConfig) -> Result<(), Error> {
    if password.len() < policy.min_length {
        return Err(Error::Validation {
            message: format!("Password must be at least {} characters", policy.min_length),
        });
    }
    if password.len() > policy.max_length {
        return Err(Error::Validation {
            message: format!("Password must be no more than {} characters", policy.max_length),
        });
    }
    Ok(())
}

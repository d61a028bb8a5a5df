//! Session token composition and parsing.
//!
//! Login tokens embed the user id in the prefix: `user:<uuid>:<random>`.
//! This avoids decoding an opaque payload on every request at the cost of
//! a longer token; the embedding is applied uniformly, and login session
//! payloads stay empty. Confirmation tokens use the email address as
//! prefix: `<email>:<random>`, with the payload carrying whatever the flow
//! needs (the user id for password resets).

use crate::errors::Error;
use crate::types::UserId;
use uuid::Uuid;

/// Prefix under which login sessions are keyed.
const LOGIN_SUBJECT: &str = "user";

/// Key prefix for a user's login sessions: `user:<uuid>`.
pub fn login_prefix(user_id: UserId) -> String {
    format!("{LOGIN_SUBJECT}:{user_id}")
}

/// Glob pattern matching every login session of a user.
pub fn login_pattern(user_id: UserId) -> String {
    format!("{LOGIN_SUBJECT}:{user_id}:*")
}

/// Glob pattern matching every confirmation session for an email address.
pub fn confirmation_pattern(email: &str) -> String {
    format!("{email}:*")
}

/// Extract the user id embedded in a login token.
///
/// Returns `None` for anything that does not look like
/// `user:<uuid>:<random>`; the caller treats that as an invalid session.
pub fn parse_login_token(token: &str) -> Option<UserId> {
    let rest = token.strip_prefix("user:")?;
    let (id, random) = rest.split_once(':')?;
    if random.is_empty() {
        return None;
    }
    Uuid::parse_str(id).ok()
}

/// Extract the email prefix of a confirmation token.
///
/// A token without the `:` separator is malformed (422). An email prefix
/// that is not a plausible address means the token cannot belong to a
/// confirmation flow; existence is checked separately by the caller.
pub fn parse_confirmation_token(token: &str) -> Result<&str, Error> {
    let (email, random) = token.split_once(':').ok_or_else(|| Error::MalformedToken {
        message: "confirmation token is missing its separator".to_string(),
    })?;
    if random.is_empty() {
        return Err(Error::MalformedToken {
            message: "confirmation token is missing its random suffix".to_string(),
        });
    }
    Ok(email)
}

/// Lightweight plausibility check for email addresses.
///
/// Full address validation is out of scope; this only has to tell emails
/// apart from other token prefixes such as `user`.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

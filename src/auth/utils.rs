//! Cookie helpers shared by the login handlers and the extractors.

use axum::http::HeaderMap;

use crate::config::Config;

/// Pull the session token out of the request's cookie header.
pub fn session_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookie_header = headers.get(axum::http::header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=')
            && name == cookie_name
        {
            return Some(value.to_string());
        }
    }
    None
}

/// Build the Set-Cookie value carrying a session token.
///
/// HttpOnly keeps the token away from client script; the CSRF token travels
/// in a response header instead.
pub fn session_cookie_header(token: &str, config: &Config) -> String {
    let session = &config.auth.session;
    format!(
        "{}={}; Path=/; HttpOnly{}; SameSite={}; Max-Age={}",
        session.cookie_name,
        token,
        if session.cookie_secure { "; Secure" } else { "" },
        session.cookie_same_site,
        session.login_lifetime.as_secs(),
    )
}

/// Build the Set-Cookie value clearing the session cookie on logout.
pub fn clear_session_cookie_header(config: &Config) -> String {
    let session = &config.auth.session;
    format!(
        "{}=; Path=/; HttpOnly{}; SameSite={}; Max-Age=0",
        session.cookie_name,
        if session.cookie_secure { "; Secure" } else { "" },
        session.cookie_same_site,
    )
}

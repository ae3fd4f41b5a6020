//! Cookie parsing and refresh-cookie construction.

use axum::http::header;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "jid";

/// SameSite handling for the refresh cookie. The cookie is always `Secure`,
/// which `SameSite=None` requires anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookiePolicy {
    /// `SameSite=Lax`
    #[default]
    Development,
    /// `SameSite=None`, for a frontend served from another site
    Production,
}

impl CookiePolicy {
    fn same_site(&self) -> &'static str {
        match self {
            CookiePolicy::Development => "Lax",
            CookiePolicy::Production => "None",
        }
    }
}

/// Extract a cookie value from the Cookie header. An empty value counts as absent.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim();
            if key.trim() == name && !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Set-Cookie value carrying a refresh token.
pub fn refresh_cookie(token: &str, max_age: u64, policy: CookiePolicy) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite={}; Path=/; Max-Age={}",
        REFRESH_COOKIE_NAME,
        token,
        policy.same_site(),
        max_age
    )
}

/// Set-Cookie value expiring the refresh cookie.
pub fn clear_refresh_cookie(policy: CookiePolicy) -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite={}; Path=/; Max-Age=0",
        REFRESH_COOKIE_NAME,
        policy.same_site()
    )
}

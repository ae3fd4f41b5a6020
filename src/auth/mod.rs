//! Request authentication.
//!
//! Every protected request carries two credentials: a short-lived access token
//! in the `Authorization: Bearer` header and a long-lived refresh token in the
//! `jid` cookie. Both embed the user's `tokenVersion`; bumping the stored
//! version (logout) revokes every outstanding pair at once.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    CookiePolicy, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind, EXPIRED_ACCESS_TOKEN_STATUS};
pub use extractors::{ApiAuth, authenticate_request, bearer_token, is_refresh_request};
pub use ip::{ClientIpHeader, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthContext;

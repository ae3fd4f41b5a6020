//! The authentication gate, exposed as an axum extractor.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, error, warn};

use super::cookie::{REFRESH_COOKIE_NAME, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthContext;
use crate::jwt::TokenKind;

/// Path segment identifying the token refresh endpoint.
const REFRESH_SEGMENT: &str = "refreshToken";

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Whether the request targets the refresh endpoint, where an expired
/// (but authentic) access token is acceptable.
pub fn is_refresh_request(path: &str) -> bool {
    path.split('/').any(|segment| segment == REFRESH_SEGMENT)
}

/// Run the gate: refresh cookie, bearer token, access token, user lookup,
/// refresh token, then the three-way token version comparison.
/// Returns on the first failing check without touching any state.
pub async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<AuthContext, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let refresh_token =
        get_cookie(&parts.headers, REFRESH_COOKIE_NAME).ok_or(AuthErrorKind::NoSession)?;

    let access_token = bearer_token(&parts.headers).ok_or(AuthErrorKind::MissingAccessToken)?;

    let access = state.tokens().verify(TokenKind::Access, access_token);
    if access.expired && !is_refresh_request(parts.uri.path()) {
        debug!(path = %parts.uri.path(), "Expired access token");
        return Err(AuthErrorKind::ExpiredAccessToken);
    }

    let claim = match access.decoded {
        Some(claim) if access.valid && !claim.user_id.is_empty() => claim,
        _ => {
            debug!("Invalid access token");
            return Err(AuthErrorKind::InvalidAccessToken);
        }
    };

    let user = state
        .db()
        .users()
        .get_by_uuid(&claim.user_id)
        .await
        .map_err(|e| {
            error!("Failed to get user: {}", e);
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    let refresh = state.tokens().verify(TokenKind::Refresh, refresh_token);
    let refresh_claim = match refresh.decoded {
        Some(claim) if refresh.valid && !refresh.expired => claim,
        _ => {
            debug!(user = %user.uuid, "Invalid or expired refresh token");
            return Err(AuthErrorKind::InvalidRefreshToken);
        }
    };

    if refresh_claim.user_id != claim.user_id {
        warn!(user = %user.uuid, "Access and refresh token belong to different users");
        return Err(AuthErrorKind::SessionMismatch);
    }

    if refresh_claim.token_version != user.token_version
        || claim.token_version != user.token_version
    {
        warn!(
            user = %user.uuid,
            stored = user.token_version,
            access = claim.token_version,
            refresh = refresh_claim.token_version,
            "Token version mismatch"
        );
        return Err(AuthErrorKind::VersionMismatch);
    }

    Ok(AuthContext { claim, user })
}

/// Extractor for endpoints that require authentication.
/// Handlers taking it only run once the whole gate has passed.
pub struct ApiAuth(pub AuthContext);

impl<S> FromRequestParts<S> for ApiAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state)
            .await
            .map(ApiAuth)
            .map_err(ApiAuthError::from)
    }
}

//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Non-standard status telling the client to call the refresh endpoint
/// instead of logging in again.
pub const EXPIRED_ACCESS_TOKEN_STATUS: u16 = 419;

/// Why the authentication gate rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No refresh cookie at all
    NoSession,
    MissingAccessToken,
    ExpiredAccessToken,
    InvalidAccessToken,
    InvalidRefreshToken,
    UserNotFound,
    /// Access and refresh token belong to different users
    SessionMismatch,
    /// Token version differs from the stored one (revoked)
    VersionMismatch,
    DatabaseError,
}

/// API authentication error, rendered as `{status, message}` JSON.
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::ExpiredAccessToken => StatusCode::from_u16(EXPIRED_ACCESS_TOKEN_STATUS)
                .unwrap_or(StatusCode::UNAUTHORIZED),
            AuthErrorKind::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NoSession => "Session not found, please login again or change browser",
            AuthErrorKind::MissingAccessToken => "Access token missing",
            AuthErrorKind::ExpiredAccessToken => "Access token expired",
            AuthErrorKind::InvalidAccessToken => "Invalid access token",
            AuthErrorKind::InvalidRefreshToken
            | AuthErrorKind::UserNotFound
            | AuthErrorKind::SessionMismatch
            | AuthErrorKind::VersionMismatch => "Unauthorized",
            AuthErrorKind::DatabaseError => "Internal server error",
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            status: &'static str,
            message: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                status: "error",
                message: self.message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiAuthError::new(AuthErrorKind::ExpiredAccessToken)
                .status_code()
                .as_u16(),
            419
        );
        assert_eq!(
            ApiAuthError::new(AuthErrorKind::VersionMismatch).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiAuthError::new(AuthErrorKind::NoSession).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiAuthError::new(AuthErrorKind::DatabaseError).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

//! Credential endpoints.
//!
//! - POST `/register` - Create a local account and start a session
//! - POST `/login` - Check email and password, start a session
//! - POST `/social-login` - Find or create an account for an external provider
//! - POST `/logout` - Revoke every token of the caller
//! - POST `/refreshToken` - Mint a new access token from a valid session

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::ApiJson;
use super::error::{ApiError, ResultExt, required};
use crate::auth::{
    ApiAuth, CookiePolicy, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie,
};
use crate::db::{CreateUserError, Database, NewUser, User};
use crate::impl_has_auth_backend;
use crate::jwt::{TokenConfig, TokenKind};
use crate::password::verify_dummy;
use crate::rate_limit::{RateLimitConfig, rate_limit_credentials};

/// Minimum password length for local accounts.
pub const MIN_PASSWORD_LEN: usize = 6;

const BAD_CREDENTIALS: &str = "Incorrect Email/Password was provided";

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub tokens: Arc<TokenConfig>,
    pub cookie_policy: CookiePolicy,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    let credentials_router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/social-login", post(social_login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_credentials,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/refreshToken", post(refresh_token))
        .with_state(state);

    Router::new().merge(credentials_router).merge(session_router)
}

/// Lowercase the domain of an email address, keeping the local part as typed.
/// Returns None unless the address has the shape `local@domain`.
pub fn normalize_email(email: &str) -> Option<String> {
    let (local, domain) = email.trim().rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("{}@{}", local, domain.to_lowercase()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct PublicUser {
    id: String,
    email: String,
    name: String,
    provider: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.uuid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            provider: user.provider.clone(),
        }
    }
}

/// Mint a token pair for `user`. Returns the access token and the Set-Cookie
/// value carrying the refresh token.
fn start_session(state: &UsersState, user: &User) -> Result<(String, String), ApiError> {
    let pair = state
        .tokens
        .issue_pair(&user.identity_claim())
        .map_err(|e| {
            error!("Failed to issue tokens: {}", e);
            ApiError::internal("Failed to generate token")
        })?;

    let cookie = refresh_cookie(
        &pair.refresh.token,
        pair.refresh.duration,
        state.cookie_policy,
    );
    Ok((pair.access.token, cookie))
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

async fn register(
    State(state): State<UsersState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required(&payload.name, "name")?;
    let email = normalize_email(required(&payload.email, "email")?)
        .ok_or_else(|| ApiError::bad_request("email is invalid"))?;
    let password = payload.password.as_deref().unwrap_or_default();

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = state
        .db
        .users()
        .create(&NewUser {
            name,
            email: &email,
            password,
            provider: "local",
        })
        .await
        .map_err(|e| match e {
            CreateUserError::EmailTaken => ApiError::conflict("Email is already in use"),
            e => ApiError::db_error("Failed to create user", e),
        })?;

    info!(user = %user.uuid, "User registered");

    let (access_token, cookie) = start_session(&state, &user)?;
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(AccessTokenResponse { access_token }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<UsersState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = required(&payload.email, "email")?;
    let password = payload
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("password is required"))?;

    let email = normalize_email(email).ok_or_else(|| ApiError::unauthorized(BAD_CREDENTIALS))?;

    let found = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to get user")?;
    let known_email = found.is_some();

    let user = check_password(found, password).await?.ok_or_else(|| {
        debug!(known_email, "Login failed");
        ApiError::unauthorized(BAD_CREDENTIALS)
    })?;

    info!(user = %user.uuid, "User logged in");

    let (access_token, cookie) = start_session(&state, &user)?;
    Ok(([(SET_COOKIE, cookie)], Json(AccessTokenResponse { access_token })))
}

/// Verify on the blocking pool. An unknown email is checked against a dummy
/// hash, so it fails in the same time as a wrong password.
async fn check_password(user: Option<User>, password: &str) -> Result<Option<User>, ApiError> {
    let candidate = password.to_string();
    tokio::task::spawn_blocking(move || match user {
        Some(user) => user.compare_password(&candidate).then_some(user),
        None => {
            verify_dummy(&candidate);
            None
        }
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Password check task failed");
        ApiError::internal("Internal server error")
    })
}

#[derive(Deserialize)]
struct SocialLoginRequest {
    email: Option<String>,
    name: Option<String>,
    provider: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SocialLoginResponse {
    access_token: String,
    user: PublicUser,
}

async fn social_login(
    State(state): State<UsersState>,
    ApiJson(payload): ApiJson<SocialLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = required(&payload.email, "email")?;
    let name = required(&payload.name, "name")?;
    let provider = required(&payload.provider, "provider")?;
    let email =
        normalize_email(email).ok_or_else(|| ApiError::bad_request("email is invalid"))?;

    let existing = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to get user")?;

    let user = match existing {
        Some(user) => user,
        None => {
            let created = state
                .db
                .users()
                .create(&NewUser {
                    name,
                    email: &email,
                    password: "",
                    provider,
                })
                .await;
            match created {
                Ok(user) => {
                    info!(user = %user.uuid, provider = %provider, "User created via social login");
                    user
                }
                // Another request created it in between.
                Err(CreateUserError::EmailTaken) => state
                    .db
                    .users()
                    .get_by_email(&email)
                    .await
                    .db_err("Failed to get user")?
                    .ok_or_else(|| ApiError::internal("Internal server error"))?,
                Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
            }
        }
    };

    let (access_token, cookie) = start_session(&state, &user)?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(SocialLoginResponse {
            access_token,
            user: PublicUser::from(&user),
        }),
    ))
}

#[derive(Deserialize)]
struct LogoutRequest {
    email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutResponse {
    message: &'static str,
    user: PublicUser,
    logged_out: bool,
}

async fn logout(
    State(state): State<UsersState>,
    ApiAuth(auth): ApiAuth,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LogoutRequest>,
) -> Result<Response, ApiError> {
    let email = required(&payload.email, "email")?;
    let email = normalize_email(email).unwrap_or_else(|| email.to_string());

    if email != auth.claim.user_email {
        warn!(user = %auth.user.uuid, "Logout for a different email");
        return Err(ApiError::unauthorized("Unauthorized"));
    }

    let refresh_token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
    let refresh_version = state
        .tokens
        .verify(TokenKind::Refresh, refresh_token)
        .decoded
        .map(|claim| claim.token_version)
        .unwrap_or(auth.claim.token_version);

    let new_version = state
        .db
        .users()
        .increment_token_version(&auth.user.uuid)
        .await
        .db_err("Failed to revoke tokens")?;

    match new_version {
        Some(version) if version != refresh_version => {
            info!(user = %auth.user.uuid, token_version = version, "User logged out");
            Ok((
                [(SET_COOKIE, clear_refresh_cookie(state.cookie_policy))],
                Json(LogoutResponse {
                    message: "Logged out successfully",
                    user: PublicUser::from(&auth.user),
                    logged_out: true,
                }),
            )
                .into_response())
        }
        _ => {
            error!(user = %auth.user.uuid, "Token version was not incremented");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": "Logout failed",
                    "loggedOut": false,
                })),
            )
                .into_response())
        }
    }
}

/// Exchange a valid session for a new access token. The gate lets an
/// expired access token through on this path only.
async fn refresh_token(
    State(state): State<UsersState>,
    ApiAuth(auth): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    let access = state
        .tokens
        .issue_access_for(&auth.user.identity_claim())
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            ApiError::internal("Failed to generate token")
        })?;

    debug!(user = %auth.user.uuid, "Access token refreshed");

    Ok(Json(AccessTokenResponse {
        access_token: access.token,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::COOKIE};

    use super::*;
    use crate::auth::AuthContext;
    use crate::jwt::TokenSettings;

    async fn state() -> UsersState {
        UsersState {
            db: Database::open(":memory:").await.unwrap(),
            tokens: Arc::new(
                TokenConfig::new(TokenSettings::new(
                    b"logout-access-secret",
                    b"logout-refresh-secret",
                    b"logout-payload-secret",
                ))
                .unwrap(),
            ),
            cookie_policy: CookiePolicy::Development,
            rate_limit_config: Arc::new(RateLimitConfig::default()),
        }
    }

    async fn create_user(state: &UsersState) -> User {
        state
            .db
            .users()
            .create(&NewUser {
                name: "Alice",
                email: "alice@example.com",
                password: "",
                provider: "google",
            })
            .await
            .unwrap()
    }

    async fn call_logout(state: &UsersState, user: User, refresh: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("jid={}", refresh)).unwrap(),
        );
        let auth = AuthContext {
            claim: user.identity_claim(),
            user,
        };
        logout(
            State(state.clone()),
            ApiAuth(auth),
            headers,
            ApiJson(LogoutRequest {
                email: Some("alice@example.com".to_string()),
            }),
        )
        .await
        .unwrap()
    }

    async fn assert_not_logged_out(response: Response) {
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(SET_COOKIE).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["loggedOut"], false);
    }

    #[tokio::test]
    async fn test_logout_of_vanished_user_fails() {
        let state = state().await;
        let user = create_user(&state).await;

        let mut ghost = user.clone();
        ghost.uuid = uuid::Uuid::new_v4().to_string();
        let pair = state.tokens.issue_pair(&ghost.identity_claim()).unwrap();

        let response = call_logout(&state, ghost, &pair.refresh.token).await;
        assert_not_logged_out(response).await;
    }

    #[tokio::test]
    async fn test_logout_without_version_change_fails() {
        let state = state().await;
        let user = create_user(&state).await;

        // A refresh token already at the version the increment will produce.
        let mut ahead = user.identity_claim();
        ahead.token_version += 1;
        let refresh = state.tokens.issue_pair(&ahead).unwrap().refresh;

        let response = call_logout(&state, user, &refresh.token).await;
        assert_not_logged_out(response).await;
    }

    #[tokio::test]
    async fn test_logout_bumps_version() {
        let state = state().await;
        let user = create_user(&state).await;
        let pair = state.tokens.issue_pair(&user.identity_claim()).unwrap();
        let uuid = user.uuid.clone();

        let response = call_logout(&state, user, &pair.refresh.token).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.db.users().get_by_uuid(&uuid).await.unwrap().unwrap();
        assert_eq!(stored.token_version, 1);
    }

    #[test]
    fn test_normalize_email_lowercases_domain_only() {
        assert_eq!(
            normalize_email("A@Test.com").as_deref(),
            Some("A@test.com")
        );
        assert_eq!(
            normalize_email("  Bob.Smith@EXAMPLE.org ").as_deref(),
            Some("Bob.Smith@example.org")
        );
    }

    #[test]
    fn test_normalize_email_rejects_malformed() {
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("user@"), None);
    }
}

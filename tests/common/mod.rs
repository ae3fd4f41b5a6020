#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use jsonwebtoken::{EncodingKey, Header};
use taskvault::{
    ServerConfig,
    auth::{ClientIpHeader, CookiePolicy},
    cipher::IdentityClaim,
    create_app,
    db::Database,
    jwt::{TokenClaims, TokenConfig, TokenSettings},
};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const PAYLOAD_SECRET: &[u8] = b"test-payload-secret-0123456789abcdef";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub tokens: Arc<TokenConfig>,
}

/// Access token plus the refresh token taken from the `jid` cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub access: String,
    pub refresh: String,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(1000, CookiePolicy::Development).await
}

pub async fn create_test_app_with(login_per_minute: u32, cookie_policy: CookiePolicy) -> TestApp {
    build_test_app(login_per_minute, cookie_policy, None).await
}

/// App that takes the client IP from `ip_header`, as when running behind a proxy.
pub async fn create_test_app_behind_proxy(
    login_per_minute: u32,
    ip_header: ClientIpHeader,
) -> TestApp {
    build_test_app(login_per_minute, CookiePolicy::Development, Some(ip_header)).await
}

async fn build_test_app(
    login_per_minute: u32,
    cookie_policy: CookiePolicy,
    ip_header: Option<ClientIpHeader>,
) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let tokens = Arc::new(
        TokenConfig::new(TokenSettings::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            PAYLOAD_SECRET,
        ))
        .expect("Invalid token settings"),
    );
    let config = ServerConfig {
        db: db.clone(),
        tokens: tokens.clone(),
        cookie_policy,
        login_per_minute,
        ip_header,
    };
    TestApp {
        app: create_app(&config),
        db,
        tokens,
    }
}

impl TestApp {
    /// Send a request with an optional JSON body and session.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
        session: Option<&Session>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            builder = builder
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access))
                .header(header::COOKIE, format!("jid={}", session.refresh));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    /// Send a raw body with explicit headers, e.g. malformed JSON.
    pub async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: &'static str,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.app
            .clone()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    /// Register a user and return the session handed out by the server.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Session {
        let response = self
            .send(
                "POST",
                "/user/register",
                Some(serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": password,
                })),
                None,
            )
            .await;
        assert_eq!(response.status(), 201, "registration failed");
        session_from(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response<Body> {
        self.send(
            "POST",
            "/user/login",
            Some(serde_json::json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    pub async fn logout(&self, email: &str, session: &Session) -> Response<Body> {
        self.send(
            "POST",
            "/user/logout",
            Some(serde_json::json!({ "email": email })),
            Some(session),
        )
        .await
    }

    pub async fn token_version(&self, email: &str) -> i64 {
        self.db
            .users()
            .get_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .token_version
    }

    /// A correctly signed access token for `claim` whose `exp` has already passed.
    pub fn expired_access_token(&self, claim: &IdentityClaim) -> String {
        let envelope = self.tokens.cipher().seal_claim(claim).unwrap();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = TokenClaims {
            iv: envelope.iv,
            content: envelope.content,
            iat: now - 120,
            exp: now - 60,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(ACCESS_SECRET),
        )
        .unwrap()
    }
}

/// The `jid` value from a Set-Cookie header, if any.
pub fn refresh_cookie_value(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let first = cookie.split(';').next()?;
            let value = first.strip_prefix("jid=")?;
            Some(value.to_string())
        })
}

pub fn set_cookie_header(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Build a session from a register/login/social-login response.
pub async fn session_from(response: Response<Body>) -> Session {
    let refresh = refresh_cookie_value(&response).expect("missing jid cookie");
    let json = body_json(response).await;
    Session {
        access: json["accessToken"].as_str().unwrap().to_string(),
        refresh,
    }
}

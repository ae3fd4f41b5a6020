//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket per client IP to slow down password guessing and
//! account spam on register, login and social login.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde_json::json;
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, warn};

use crate::auth::{ClientIpHeader, extract_client_ip};

/// Default number of credential requests per minute per IP.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 10;

/// Past this many tracked clients, buckets that are full again are dropped.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Key for requests whose address cannot be determined. They share one bucket.
const UNKNOWN_CLIENT: &str = "unknown";

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub credentials: Arc<IpLimiter>,
    /// Proxy header to read the client address from, if any
    pub ip_header: Option<ClientIpHeader>,
}

impl RateLimitConfig {
    /// Allow `per_minute` requests per IP, with a burst of the same size.
    /// Zero is treated as one.
    pub fn new(per_minute: u32, ip_header: Option<ClientIpHeader>) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            credentials: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            ip_header,
        }
    }

    /// Check one request from `ip` and keep the key space bounded.
    pub fn check(&self, ip: &str) -> bool {
        let allowed = self.credentials.check_key(&ip.to_string()).is_ok();
        if self.credentials.len() > MAX_TRACKED_CLIENTS {
            self.credentials.retain_recent();
            self.credentials.shrink_to_fit();
            debug!(tracked = self.credentials.len(), "Pruned rate limiter state");
        }
        allowed
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PER_MINUTE, None)
    }
}

/// Middleware for rate limiting register, login and social login.
pub async fn rate_limit_credentials(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, config.ip_header)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    if config.check(&ip) {
        return next.run(request).await;
    }

    warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "status": "error",
            "message": "Too many requests. Please try again later.",
        })),
    )
        .into_response()
}

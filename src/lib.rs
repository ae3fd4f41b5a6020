pub mod api;
pub mod auth;
pub mod cipher;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use api::{ApiError, create_api_router};
use auth::{ClientIpHeader, CookiePolicy};
use axum::Router;
use db::Database;
use jwt::TokenConfig;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Token secrets, lifetimes and the payload cipher
    pub tokens: Arc<TokenConfig>,
    /// SameSite mode of the refresh cookie
    pub cookie_policy: CookiePolicy,
    /// Credential requests allowed per minute per client IP
    pub login_per_minute: u32,
    /// Proxy header trusted for the client IP; `None` uses the peer address
    pub ip_header: Option<ClientIpHeader>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.login_per_minute,
        config.ip_header,
    ));

    create_api_router(
        config.db.clone(),
        config.tokens.clone(),
        config.cookie_policy,
        rate_limit_config,
    )
    .fallback(|| async { ApiError::not_found("No route found") })
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}

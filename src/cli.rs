//! CLI argument parsing, secret loading, and startup helpers.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use crate::ServerConfig;
use crate::auth::{ClientIpHeader, CookiePolicy};
use crate::db::Database;
use crate::jwt::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS, TokenConfig, TokenSettings,
};
use crate::rate_limit::DEFAULT_LOGIN_PER_MINUTE;

const MIN_SECRET_LENGTH: usize = 32;

pub const ACCESS_SECRET_VAR: &str = "ACCESS_TOKEN_SECRET";
pub const REFRESH_SECRET_VAR: &str = "REFRESH_TOKEN_SECRET";
pub const PAYLOAD_SECRET_VAR: &str = "PAYLOAD_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Deployment environment, which decides the refresh cookie's SameSite mode.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn cookie_policy(&self) -> CookiePolicy {
        match self {
            Environment::Development => CookiePolicy::Development,
            Environment::Production => CookiePolicy::Production,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskvault",
    about = "Task tracker API with revocable token sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "taskvault.db")]
    pub database: String,

    /// Deployment environment (controls cookie SameSite)
    #[arg(short, long, value_enum, default_value = "development")]
    pub environment: Environment,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_TOKEN_TTL_SECS)]
    pub refresh_token_ttl: u64,

    /// Path to file containing the access token secret. Prefer ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Path to file containing the payload encryption secret. Prefer PAYLOAD_SECRET.
    /// Falls back to the access token secret
    #[arg(long)]
    pub payload_secret_file: Option<String>,

    /// Register, login and social-login requests allowed per minute per IP
    #[arg(long, default_value_t = DEFAULT_LOGIN_PER_MINUTE)]
    pub login_per_minute: u32,

    /// Proxy header holding the client IP for rate limiting. Only set this
    /// behind a proxy that overwrites it; otherwise the peer address is used
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Look a secret up in `env_var`, then in `file`.
/// `Ok(None)` means neither is set; `Err(())` means an error was logged.
fn read_secret(env_var: &str, file: Option<&str>) -> Result<Option<String>, ()> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return Err(());
            }
        }
    } else {
        return Ok(None);
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_SECRET_LENGTH
        );
        return Err(());
    }

    Ok(Some(secret))
}

/// Load a required secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    match read_secret(env_var, file) {
        Ok(Some(secret)) => Some(secret),
        Ok(None) => {
            error!(
                "{} is required. Set the environment variable (recommended) or pass a secret file",
                env_var
            );
            None
        }
        Err(()) => None,
    }
}

/// Load all three token secrets and lifetimes from the arguments.
pub fn load_token_settings(args: &Args) -> Option<TokenSettings> {
    let access = load_secret(ACCESS_SECRET_VAR, args.access_secret_file.as_deref())?;
    let refresh = load_secret(REFRESH_SECRET_VAR, args.refresh_secret_file.as_deref())?;
    let payload = match read_secret(PAYLOAD_SECRET_VAR, args.payload_secret_file.as_deref()) {
        Ok(Some(secret)) => secret,
        Ok(None) => {
            info!("No payload secret set, using the access token secret");
            access.clone()
        }
        Err(()) => return None,
    };

    if access == refresh {
        error!("Access and refresh token secrets must differ");
        return None;
    }

    let mut settings =
        TokenSettings::new(access.as_bytes(), refresh.as_bytes(), payload.as_bytes());
    settings.access_ttl = args.access_token_ttl;
    settings.refresh_ttl = args.refresh_token_ttl;
    Some(settings)
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if the token settings are unusable.
pub fn build_config(
    db: Database,
    settings: TokenSettings,
    environment: Environment,
    login_per_minute: u32,
    ip_header: Option<ClientIpHeader>,
) -> Option<ServerConfig> {
    let tokens = match TokenConfig::new(settings) {
        Ok(tokens) => tokens,
        Err(e) => {
            error!(error = %e, "Invalid token configuration");
            return None;
        }
    };

    Some(ServerConfig {
        db,
        tokens: Arc::new(tokens),
        cookie_policy: environment.cookie_policy(),
        login_per_minute,
        ip_header,
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

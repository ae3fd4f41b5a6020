mod error;
mod json;
mod tasks;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::CookiePolicy;
use crate::db::Database;
use crate::jwt::TokenConfig;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};
pub use json::ApiJson;
pub use users::{MIN_PASSWORD_LEN, UsersState, normalize_email};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    tokens: Arc<TokenConfig>,
    cookie_policy: CookiePolicy,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let tasks_state = tasks::TasksState {
        db: db.clone(),
        tokens: tokens.clone(),
    };

    let users_state = users::UsersState {
        db,
        tokens,
        cookie_policy,
        rate_limit_config,
    };

    Router::new()
        .nest("/user", users::router(users_state))
        .nest("/task", tasks::router(tasks_state))
}

use sqlx::sqlite::SqlitePool;

use crate::cipher::IdentityClaim;
use crate::password::{hash_password, verify_dummy, verify_password};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string, absent for social-login accounts
    pub password_hash: Option<String>,
    pub provider: String,
    /// Revocation counter: tokens are only honoured while they carry this value
    pub token_version: i64,
    pub created_at: String,
}

impl User {
    /// Compare a candidate password with the stored hash. Accounts without
    /// one still pay for a verification. Blocking; run off the async runtime.
    pub fn compare_password(&self, candidate: &str) -> bool {
        match &self.password_hash {
            Some(hash) => verify_password(candidate, hash),
            None => verify_dummy(candidate),
        }
    }

    /// The claim to embed in tokens minted for this user right now.
    pub fn identity_claim(&self) -> IdentityClaim {
        IdentityClaim {
            user_id: self.uuid.clone(),
            user_email: self.email.clone(),
            token_version: self.token_version,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    name: String,
    email: String,
    password_hash: Option<String>,
    provider: String,
    token_version: i64,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            provider: row.provider,
            token_version: row.token_version,
            created_at: row.created_at,
        }
    }
}

/// Input for [`UserStore::create`]. The password is plain text; an empty one
/// (social login) stores no hash.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub provider: &'a str,
}

#[derive(Debug)]
pub enum CreateUserError {
    EmailTaken,
    Hash(argon2::password_hash::Error),
    Blocking(tokio::task::JoinError),
    Database(sqlx::Error),
}

impl std::fmt::Display for CreateUserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateUserError::EmailTaken => write!(f, "Email is already in use"),
            CreateUserError::Hash(e) => write!(f, "Failed to hash password: {}", e),
            CreateUserError::Blocking(e) => write!(f, "Password hashing task failed: {}", e),
            CreateUserError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for CreateUserError {}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with `token_version` 0, hashing the password first.
    pub async fn create(&self, new: &NewUser<'_>) -> Result<User, CreateUserError> {
        let password_hash = if new.password.is_empty() {
            None
        } else {
            let password = new.password.to_string();
            let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .map_err(CreateUserError::Blocking)?;
            Some(hashed.map_err(CreateUserError::Hash)?)
        };
        let uuid = uuid::Uuid::new_v4().to_string();

        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (uuid, name, email, password_hash, provider) VALUES (?, ?, ?, ?, ?)
             RETURNING id, uuid, name, email, password_hash, provider, token_version, created_at",
        )
        .bind(uuid)
        .bind(new.name)
        .bind(new.email)
        .bind(password_hash)
        .bind(new.provider)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CreateUserError::EmailTaken
            }
            e => CreateUserError::Database(e),
        })?;

        Ok(User::from(row))
    }

    /// Get a user by email (exact match).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, name, email, password_hash, provider, token_version, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID, the `userID` carried in tokens. This is the by-id lookup.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, name, email, password_hash, provider, token_version, created_at FROM users WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Atomically bump `token_version` by one, revoking every outstanding token.
    /// Returns the new value, or None if the user does not exist.
    pub async fn increment_token_version(&self, uuid: &str) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET token_version = token_version + 1, updated_at = datetime('now') WHERE uuid = ? RETURNING token_version",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }
}

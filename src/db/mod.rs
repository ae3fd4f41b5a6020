mod tasks;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use tasks::{Task, TaskStatus, TaskStore};
pub use user::{CreateUserError, NewUser, User, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Email is case-sensitive on purpose: only the domain is normalized.
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    email TEXT UNIQUE NOT NULL,
                    password_hash TEXT,
                    provider TEXT NOT NULL DEFAULT 'local',
                    token_version INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_email ON users(email)",
                "CREATE TABLE tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    task_name TEXT NOT NULL,
                    description TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'Pending',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_tasks_uuid ON tasks(uuid)",
                "CREATE INDEX idx_tasks_user_id ON tasks(user_id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the task store.
    pub fn tasks(&self) -> TaskStore {
        TaskStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser<'static> {
        NewUser {
            name: "Alice",
            email: "alice@example.com",
            password: "secret1",
            provider: "local",
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db.users().create(&alice()).await.unwrap();
        assert_eq!(user.token_version, 0);
        assert_eq!(user.provider, "local");

        let by_email = db
            .users()
            .get_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);

        let by_uuid = db.users().get_by_uuid(&user.uuid).await.unwrap().unwrap();
        assert_eq!(by_uuid.id, user.id);
        assert_eq!(by_uuid.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_password_is_hashed() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db.users().create(&alice()).await.unwrap();
        let hash = user.password_hash.as_deref().unwrap();
        assert_ne!(hash, "secret1");
        assert!(user.compare_password("secret1"));
        assert!(!user.compare_password("secret2"));
    }

    #[tokio::test]
    async fn test_empty_password_never_matches() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db
            .users()
            .create(&NewUser {
                password: "",
                provider: "google",
                ..alice()
            })
            .await
            .unwrap();

        assert!(user.password_hash.is_none());
        assert!(!user.compare_password(""));
        assert!(!user.compare_password("anything"));
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&alice()).await.unwrap();
        let result = db.users().create(&alice()).await;

        assert!(matches!(result, Err(CreateUserError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_email_local_part_is_case_sensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&alice()).await.unwrap();
        db.users()
            .create(&NewUser {
                email: "Alice@example.com",
                ..alice()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_increment_token_version() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db.users().create(&alice()).await.unwrap();
        assert_eq!(
            db.users().increment_token_version(&user.uuid).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            db.users().increment_token_version(&user.uuid).await.unwrap(),
            Some(2)
        );
        assert_eq!(
            db.users().increment_token_version("missing").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.users().create(&alice()).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let db = db.clone();
                let uuid = user.uuid.clone();
                tokio::spawn(async move { db.users().increment_token_version(&uuid).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let user = db.users().get_by_uuid(&user.uuid).await.unwrap().unwrap();
        assert_eq!(user.token_version, 10);
    }
}

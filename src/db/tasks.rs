//! Task storage. Every query is scoped to the owning user.

use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskStatus {
    Pending,
    Completed,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Pending, TaskStatus::Completed, TaskStatus::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Completed => "Completed",
            TaskStatus::Done => "Done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(TaskStatus::Pending),
            "Completed" => Some(TaskStatus::Completed),
            "Done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub task_name: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    uuid: String,
    user_id: i64,
    task_name: String,
    description: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            user_id: row.user_id,
            task_name: row.task_name,
            description: row.description,
            status: TaskStatus::parse(&row.status).unwrap_or(TaskStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending task for a user.
    pub async fn create(
        &self,
        user_id: i64,
        task_name: &str,
        description: &str,
    ) -> Result<Task, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let row: TaskRow = sqlx::query_as(
            "INSERT INTO tasks (uuid, user_id, task_name, description) VALUES (?, ?, ?, ?)
             RETURNING id, uuid, user_id, task_name, description, status, created_at, updated_at",
        )
        .bind(uuid)
        .bind(user_id)
        .bind(task_name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(Task::from(row))
    }

    /// List all tasks of a user, oldest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Task>, sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, uuid, user_id, task_name, description, status, created_at, updated_at
             FROM tasks WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    /// Change a task's status. Returns None if the task does not exist or
    /// belongs to someone else.
    pub async fn update_status(
        &self,
        uuid: &str,
        user_id: i64,
        status: TaskStatus,
    ) -> Result<Option<Task>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as(
            "UPDATE tasks SET status = ?, updated_at = datetime('now') WHERE uuid = ? AND user_id = ?
             RETURNING id, uuid, user_id, task_name, description, status, created_at, updated_at",
        )
        .bind(status.as_str())
        .bind(uuid)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Task::from))
    }

    /// Delete a task, returning it. None if missing or not owned by `user_id`.
    pub async fn delete(&self, uuid: &str, user_id: i64) -> Result<Option<Task>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as(
            "DELETE FROM tasks WHERE uuid = ? AND user_id = ?
             RETURNING id, uuid, user_id, task_name, description, status, created_at, updated_at",
        )
        .bind(uuid)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Task::from))
    }
}

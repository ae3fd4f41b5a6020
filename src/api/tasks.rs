//! Task endpoints. All of them sit behind the authentication gate and only
//! ever see the caller's own tasks.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::ApiJson;
use super::error::{ApiError, ResultExt, required, validate_uuid};
use crate::auth::ApiAuth;
use crate::db::{Database, Task, TaskStatus};
use crate::impl_has_auth_backend;
use crate::jwt::TokenConfig;

#[derive(Clone)]
pub struct TasksState {
    pub db: Database,
    pub tokens: Arc<TokenConfig>,
}

impl_has_auth_backend!(TasksState);

pub fn router(state: TasksState) -> Router {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/{task_id}/status", put(update_status))
        .route("/{task_id}", delete(delete_task))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResponse {
    id: String,
    user_id: String,
    task_name: String,
    description: String,
    status: TaskStatus,
    created_at: String,
    updated_at: String,
}

impl TaskResponse {
    fn new(task: Task, owner: &str) -> Self {
        Self {
            id: task.uuid,
            user_id: owner.to_string(),
            task_name: task.task_name,
            description: task.description,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Serialize, Default)]
struct GroupedTasks {
    #[serde(rename = "Pending")]
    pending: Vec<TaskResponse>,
    #[serde(rename = "Completed")]
    completed: Vec<TaskResponse>,
    #[serde(rename = "Done")]
    done: Vec<TaskResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    task_name: Option<String>,
    description: Option<String>,
}

async fn create_task(
    State(state): State<TasksState>,
    ApiAuth(auth): ApiAuth,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task_name = required(&payload.task_name, "taskName")?;
    let description = payload.description.as_deref().unwrap_or_default().trim();

    let task = state
        .db
        .tasks()
        .create(auth.user.id, task_name, description)
        .await
        .db_err("Failed to create task")?;

    info!(user = %auth.user.uuid, task = %task.uuid, "Task created");

    Ok((
        StatusCode::CREATED,
        Json(TaskResponse::new(task, &auth.user.uuid)),
    ))
}

async fn list_tasks(
    State(state): State<TasksState>,
    ApiAuth(auth): ApiAuth,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state
        .db
        .tasks()
        .list_by_user(auth.user.id)
        .await
        .db_err("Failed to list tasks")?;

    let mut grouped = GroupedTasks::default();
    for task in tasks {
        let bucket = match task.status {
            TaskStatus::Pending => &mut grouped.pending,
            TaskStatus::Completed => &mut grouped.completed,
            TaskStatus::Done => &mut grouped.done,
        };
        bucket.push(TaskResponse::new(task, &auth.user.uuid));
    }

    Ok(Json(grouped))
}

#[derive(Deserialize)]
struct UpdateStatusRequest {
    status: Option<String>,
}

async fn update_status(
    State(state): State<TasksState>,
    ApiAuth(auth): ApiAuth,
    Path(task_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&task_id)?;
    let status = TaskStatus::parse(required(&payload.status, "status")?).ok_or_else(|| {
        ApiError::bad_request("status must be one of Pending, Completed, Done")
    })?;

    let task = state
        .db
        .tasks()
        .update_status(&task_id, auth.user.id, status)
        .await
        .db_err("Failed to update task")?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(Json(TaskResponse::new(task, &auth.user.uuid)))
}

async fn delete_task(
    State(state): State<TasksState>,
    ApiAuth(auth): ApiAuth,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&task_id)?;

    let task = state
        .db
        .tasks()
        .delete(&task_id, auth.user.id)
        .await
        .db_err("Failed to delete task")?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    info!(user = %auth.user.uuid, task = %task.uuid, "Task deleted");

    Ok(Json(TaskResponse::new(task, &auth.user.uuid)))
}

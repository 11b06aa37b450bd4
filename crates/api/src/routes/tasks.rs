//! Task mutation gateway routes
//!
//! Every route authenticates the caller and rejects a `user_id` path segment
//! that differs from the token's principal before touching the gateway.

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tasklane_common::{Task, TaskId, UserId};
use tasklane_engine::{CreateTaskRequest, UpdateTaskRequest};
use tracing::instrument;
use uuid::Uuid;

fn authorize(path_user: Uuid, auth: &AuthUser) -> Result<UserId, ApiError> {
    let principal = auth.0;
    if UserId(path_user) != principal {
        return Err(ApiError::forbidden(
            "path user does not match the authenticated principal",
        ));
    }
    Ok(principal)
}

#[instrument(skip(state, auth, request), fields(user_id = %user_id))]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let principal = authorize(user_id, &auth)?;
    let task = state.gateway.create(principal, request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, auth), fields(user_id = %user_id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let principal = authorize(user_id, &auth)?;
    let tasks = state.gateway.list(principal).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, auth), fields(user_id = %user_id, task_id = %task_id))]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, ApiError> {
    let principal = authorize(user_id, &auth)?;
    let task = state.gateway.get(principal, TaskId(task_id)).await?;
    Ok(Json(task))
}

#[instrument(skip(state, auth, request), fields(user_id = %user_id, task_id = %task_id))]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let principal = authorize(user_id, &auth)?;
    let task = state
        .gateway
        .update(principal, TaskId(task_id), request)
        .await?;
    Ok(Json(task))
}

#[instrument(skip(state, auth), fields(user_id = %user_id, task_id = %task_id))]
pub async fn toggle_complete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, ApiError> {
    let principal = authorize(user_id, &auth)?;
    let task = state
        .gateway
        .toggle_complete(principal, TaskId(task_id))
        .await?;
    Ok(Json(task))
}

#[instrument(skip(state, auth), fields(user_id = %user_id, task_id = %task_id))]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let principal = authorize(user_id, &auth)?;
    state.gateway.delete(principal, TaskId(task_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

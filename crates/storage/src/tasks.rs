//! Postgres implementation of [`TaskRepository`]

use crate::postgres::db_err;
use crate::repository::{SuccessorOutcome, TaskRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use tasklane_common::{
    EngineError, Priority, RecurrencePattern, Result, Task, TaskId, UserId,
};
use tracing::instrument;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, user_id, title, description, priority, tags, is_completed, \
     due_date, remind_at, is_recurring, recurrence_pattern, parent_task_id, \
     next_occurrence_id, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: Option<String>,
    priority: String,
    tags: Vec<String>,
    is_completed: bool,
    due_date: Option<DateTime<Utc>>,
    remind_at: Option<DateTime<Utc>>,
    is_recurring: bool,
    recurrence_pattern: Option<String>,
    parent_task_id: Option<Uuid>,
    next_occurrence_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = EngineError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let priority = Priority::from_str(&row.priority)
            .map_err(|_| EngineError::Database(format!("unknown priority '{}'", row.priority)))?;
        let recurrence_pattern = row
            .recurrence_pattern
            .as_deref()
            .map(RecurrencePattern::from_str)
            .transpose()
            .map_err(|_| {
                EngineError::Database(format!(
                    "unknown recurrence pattern '{}'",
                    row.recurrence_pattern.as_deref().unwrap_or_default()
                ))
            })?;

        Ok(Task {
            id: TaskId(row.id),
            user_id: UserId(row.user_id),
            title: row.title,
            description: row.description,
            priority,
            tags: row.tags,
            is_completed: row.is_completed,
            due_date: row.due_date,
            remind_at: row.remind_at,
            is_recurring: row.is_recurring,
            recurrence_pattern,
            parent_task_id: row.parent_task_id.map(TaskId),
            next_occurrence_id: row.next_occurrence_id.map(TaskId),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn insert(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, user_id, title, description, priority, tags, \
             is_completed, due_date, remind_at, is_recurring, recurrence_pattern, \
             parent_task_id, next_occurrence_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(task.id.0)
        .bind(task.user_id.0)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.to_string())
        .bind(&task.tags)
        .bind(task.is_completed)
        .bind(task.due_date)
        .bind(task.remind_at)
        .bind(task.is_recurring)
        .bind(task.recurrence_pattern.map(|p| p.to_string()))
        .bind(task.parent_task_id.map(|id| id.0))
        .bind(task.next_occurrence_id.map(|id| id.0))
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn fetch(&self, task_id: TaskId) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(task_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Task::try_from).transpose()
    }

    async fn fetch_owned(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        ))
        .bind(task_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Task::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE user_id = $1 AND deleted_at IS NULL ORDER BY created_at DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Task::try_from).collect()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn update_content(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET title = $2, description = $3, priority = $4, tags = $5, \
             due_date = $6, remind_at = $7, is_recurring = $8, recurrence_pattern = $9, \
             updated_at = $10 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(task.id.0)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.to_string())
        .bind(&task.tags)
        .bind(task.due_date)
        .bind(task.remind_at)
        .bind(task.is_recurring)
        .bind(task.recurrence_pattern.map(|p| p.to_string()))
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn toggle_completed(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(task_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut task = Task::try_from(row)?;

        task.is_completed = !task.is_completed;
        task.updated_at = Utc::now();

        sqlx::query("UPDATE tasks SET is_completed = $2, updated_at = $3 WHERE id = $1")
            .bind(task.id.0)
            .bind(task.is_completed)
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(Some(task))
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn tombstone(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(task_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let task = Task::try_from(row)?;

        sqlx::query("UPDATE tasks SET deleted_at = $2, updated_at = $2 WHERE id = $1")
            .bind(task.id.0)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(Some(task))
    }

    #[instrument(skip(self, successor), fields(parent_id = %parent_id, successor_id = %successor.id))]
    async fn create_successor(
        &self,
        parent_id: TaskId,
        successor: &Task,
    ) -> Result<SuccessorOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Redelivered completion events serialize on this lock; the second
        // delivery sees next_occurrence_id already set.
        let parent: Option<(Option<Uuid>,)> = sqlx::query_as(
            "SELECT next_occurrence_id FROM tasks \
             WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(parent_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some((next_occurrence_id,)) = parent else {
            return Ok(SuccessorOutcome::ParentMissing);
        };
        if let Some(existing) = next_occurrence_id {
            return Ok(SuccessorOutcome::AlreadyLinked(TaskId(existing)));
        }

        sqlx::query(
            "INSERT INTO tasks (id, user_id, title, description, priority, tags, \
             is_completed, due_date, remind_at, is_recurring, recurrence_pattern, \
             parent_task_id, next_occurrence_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(successor.id.0)
        .bind(successor.user_id.0)
        .bind(&successor.title)
        .bind(&successor.description)
        .bind(successor.priority.to_string())
        .bind(&successor.tags)
        .bind(successor.is_completed)
        .bind(successor.due_date)
        .bind(successor.remind_at)
        .bind(successor.is_recurring)
        .bind(successor.recurrence_pattern.map(|p| p.to_string()))
        .bind(successor.parent_task_id.map(|id| id.0))
        .bind(successor.next_occurrence_id.map(|id| id.0))
        .bind(successor.created_at)
        .bind(successor.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE tasks SET next_occurrence_id = $2 WHERE id = $1")
            .bind(parent_id.0)
            .bind(successor.id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(SuccessorOutcome::Created)
    }
}

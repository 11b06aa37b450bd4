//! Postgres mirror of jobs registered with the external job facility

use crate::postgres::db_err;
use crate::repository::ReminderMirror;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use tasklane_common::{
    EngineError, ReminderChannel, ReminderJob, ReminderStatus, Result, TaskId, UserId,
};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct ReminderRow {
    task_id: Uuid,
    user_id: Uuid,
    fire_at: DateTime<Utc>,
    channels: Vec<String>,
    status: String,
}

impl TryFrom<ReminderRow> for ReminderJob {
    type Error = EngineError;

    fn try_from(row: ReminderRow) -> Result<Self> {
        let channels = row
            .channels
            .iter()
            .map(|c| {
                ReminderChannel::from_str(c)
                    .map_err(|_| EngineError::Database(format!("unknown channel '{c}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        let status = ReminderStatus::from_str(&row.status)
            .map_err(|_| EngineError::Database(format!("unknown reminder status '{}'", row.status)))?;

        Ok(ReminderJob {
            task_id: TaskId(row.task_id),
            user_id: UserId(row.user_id),
            fire_at: row.fire_at,
            channels,
            status,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgReminderMirror {
    pool: PgPool,
}

impl PgReminderMirror {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderMirror for PgReminderMirror {
    #[instrument(skip(self, job), fields(task_id = %job.task_id, fire_at = %job.fire_at))]
    async fn upsert(&self, job: &ReminderJob) -> Result<()> {
        let channels: Vec<String> = job.channels.iter().map(|c| c.to_string()).collect();

        sqlx::query(
            "INSERT INTO reminders (task_id, user_id, fire_at, channels, status, updated_at) \
             VALUES ($1, $2, $3, $4, 'scheduled', $5) \
             ON CONFLICT (task_id) DO UPDATE SET \
             fire_at = EXCLUDED.fire_at, channels = EXCLUDED.channels, \
             status = 'scheduled', updated_at = EXCLUDED.updated_at",
        )
        .bind(job.task_id.0)
        .bind(job.user_id.0)
        .bind(job.fire_at)
        .bind(&channels)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<ReminderJob>> {
        let row: Option<ReminderRow> = sqlx::query_as(
            "SELECT task_id, user_id, fire_at, channels, status \
             FROM reminders WHERE task_id = $1",
        )
        .bind(task_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(ReminderJob::try_from).transpose()
    }

    #[instrument(skip(self), fields(task_id = %task_id, status = %status))]
    async fn mark(&self, task_id: TaskId, status: ReminderStatus) -> Result<bool> {
        // Transitions are one-shot: only a scheduled job can move.
        let result = sqlx::query(
            "UPDATE reminders SET status = $2, updated_at = $3 \
             WHERE task_id = $1 AND status = 'scheduled'",
        )
        .bind(task_id.0)
        .bind(status.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn scheduled_jobs(&self) -> Result<Vec<ReminderJob>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT task_id, user_id, fire_at, channels, status \
             FROM reminders WHERE status = 'scheduled' ORDER BY fire_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(ReminderJob::try_from).collect()
    }
}

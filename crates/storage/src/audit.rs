//! Postgres implementation of the append-only audit log

use crate::postgres::db_err;
use crate::repository::AuditLog;
use async_trait::async_trait;
use sqlx::PgPool;
use tasklane_common::{AuditRecord, Result};
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    #[instrument(skip(self, record), fields(event_id = %record.event_id, event_type = %record.event_type))]
    async fn append(&self, record: &AuditRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO events_log (event_id, user_id, event_type, entity_type, \
             entity_id, prior_state, new_state, source, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(record.event_id.0)
        .bind(record.user_id.0)
        .bind(&record.event_type)
        .bind(&record.entity_type)
        .bind(record.entity_id)
        .bind(&record.prior_state)
        .bind(&record.new_state)
        .bind(&record.source)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest_state(
        &self,
        entity_id: uuid::Uuid,
    ) -> Result<Option<serde_json::Value>> {
        let row: Option<(Option<serde_json::Value>,)> = sqlx::query_as(
            "SELECT new_state FROM events_log WHERE entity_id = $1 \
             ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.and_then(|(state,)| state))
    }
}

//! Audit Recorder: appends one immutable row per consumed event.
//!
//! A pure sink — it never publishes and never blocks upstream. Redelivered
//! envelopes are collapsed by the `event_id` dedup in the log itself.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tasklane_common::{AuditRecord, EventEnvelope, EventType};
use tasklane_messaging::{EventHandler, Outcome};
use tasklane_storage::AuditLog;
use tracing::{debug, error, instrument, warn};

pub struct AuditRecorder {
    log: Arc<dyn AuditLog>,
}

impl AuditRecorder {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }

    /// Publishing service, inferred from the event shape: successor tasks
    /// carry a lineage parent, everything else task-shaped comes from the
    /// gateway, and fired reminders only ever come from the scheduler.
    fn source_of(envelope: &EventEnvelope) -> &'static str {
        match envelope.event_type {
            EventType::TaskCreated => {
                let from_recurrence = envelope
                    .task_payload()
                    .map(|p| p.task.parent_task_id.is_some())
                    .unwrap_or(false);
                if from_recurrence {
                    "recurrence-worker"
                } else {
                    "gateway"
                }
            }
            EventType::TaskUpdated | EventType::TaskCompleted | EventType::TaskDeleted => "gateway",
            EventType::ReminderScheduled => "gateway",
            EventType::ReminderFired => "reminder-scheduler",
        }
    }

    async fn build_record(&self, envelope: &EventEnvelope) -> Result<AuditRecord, serde_json::Error> {
        let (entity_type, prior_state, new_state) = match envelope.event_type {
            EventType::TaskCreated => {
                let payload = envelope.task_payload()?;
                ("task", None, Some(serde_json::to_value(&payload.task)?))
            }
            EventType::TaskUpdated | EventType::TaskCompleted => {
                let payload = envelope.task_payload()?;
                let prior = self
                    .log
                    .latest_state(envelope.task_id.0)
                    .await
                    .unwrap_or_default();
                ("task", prior, Some(serde_json::to_value(&payload.task)?))
            }
            EventType::TaskDeleted => {
                let payload = envelope.task_payload()?;
                ("task", Some(serde_json::to_value(&payload.task)?), None)
            }
            EventType::ReminderScheduled => {
                let payload = envelope.reminder_scheduled_payload()?;
                (
                    "reminder",
                    None,
                    Some(json!({ "fire_at": payload.fire_at, "channels": payload.channels })),
                )
            }
            EventType::ReminderFired => {
                let payload = envelope.reminder_fired_payload()?;
                (
                    "reminder",
                    None,
                    Some(json!({ "fire_at": payload.fire_at, "channels": payload.channels })),
                )
            }
        };

        Ok(AuditRecord {
            event_id: envelope.event_id,
            user_id: envelope.user_id,
            event_type: envelope.event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: envelope.task_id.0,
            prior_state,
            new_state,
            source: Self::source_of(envelope).to_string(),
            timestamp: envelope.timestamp,
        })
    }
}

#[async_trait]
impl EventHandler for AuditRecorder {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: EventEnvelope) -> Outcome {
        let record = match self.build_record(&envelope).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Malformed envelope payload; poisoned message dropped");
                return Outcome::Drop;
            }
        };

        match self.log.append(&record).await {
            Ok(true) => Outcome::Success,
            Ok(false) => {
                debug!("Duplicate event_id; audit row already present");
                Outcome::Success
            }
            Err(e) => {
                error!(error = %e, "Failed to append audit record; requesting redelivery");
                Outcome::Retry
            }
        }
    }
}

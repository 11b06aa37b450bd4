//! Wire envelope and typed payloads for every pub/sub topic

use crate::types::{EventId, ReminderChannel, Task, TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic names as advertised to the sidecar
pub mod topics {
    /// Primary completion / creation / deletion signals; consumed by the
    /// recurrence worker and the audit recorder.
    pub const TASK_EVENTS: &str = "task-events";
    /// Scheduling requests and fired notifications; consumed by the reminder
    /// scheduler and the audit recorder.
    pub const REMINDERS: &str = "reminders";
    /// User-visible deltas; consumed by the realtime fanout and the audit
    /// recorder.
    pub const TASK_UPDATES: &str = "task-updates";
}

/// Stable wire identifiers for every event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "reminder.scheduled")]
    ReminderScheduled,
    #[serde(rename = "reminder.fired")]
    ReminderFired,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task.created",
            Self::TaskUpdated => "task.updated",
            Self::TaskCompleted => "task.completed",
            Self::TaskDeleted => "task.deleted",
            Self::ReminderScheduled => "reminder.scheduled",
            Self::ReminderFired => "reminder.fired",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed outer structure wrapping every published event.
///
/// Identifiers serialize as canonical lowercase hyphenated strings and
/// timestamps as ISO-8601 UTC; envelopes are immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub event_type: EventType,
    pub user_id: UserId,
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Envelope for a `task.*` event carrying the full task snapshot.
    /// `changed_fields` is only present on updates.
    pub fn task_event(
        event_type: EventType,
        task: &Task,
        changed_fields: Option<Vec<String>>,
    ) -> Self {
        let payload = TaskEventPayload {
            task: task.clone(),
            changed_fields,
        };
        Self {
            event_id: EventId::new(),
            event_type,
            user_id: task.user_id,
            task_id: task.id,
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Envelope requesting a reminder registration for a task.
    pub fn reminder_scheduled(
        task: &Task,
        fire_at: DateTime<Utc>,
        channels: Vec<ReminderChannel>,
    ) -> Self {
        let payload = ReminderScheduledPayload { fire_at, channels };
        Self {
            event_id: EventId::new(),
            event_type: EventType::ReminderScheduled,
            user_id: task.user_id,
            task_id: task.id,
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Envelope announcing that a reminder fired, with the task snapshot.
    pub fn reminder_fired(
        task: &Task,
        fire_at: DateTime<Utc>,
        channels: Vec<ReminderChannel>,
    ) -> Self {
        let payload = ReminderFiredPayload {
            task: task.clone(),
            fire_at,
            channels,
        };
        Self {
            event_id: EventId::new(),
            event_type: EventType::ReminderFired,
            user_id: task.user_id,
            task_id: task.id,
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Decode the payload of a `task.*` envelope
    pub fn task_payload(&self) -> Result<TaskEventPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Decode the payload of a `reminder.scheduled` envelope
    pub fn reminder_scheduled_payload(
        &self,
    ) -> Result<ReminderScheduledPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Decode the payload of a `reminder.fired` envelope
    pub fn reminder_fired_payload(&self) -> Result<ReminderFiredPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of `task.created` / `task.updated` / `task.completed` /
/// `task.deleted`: the full snapshot, plus which fields an update touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventPayload {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Vec<String>>,
}

/// Payload of `reminder.scheduled`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderScheduledPayload {
    pub fire_at: DateTime<Utc>,
    pub channels: Vec<ReminderChannel>,
}

/// Payload of `reminder.fired`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderFiredPayload {
    #[serde(flatten)]
    pub task: Task,
    pub fire_at: DateTime<Utc>,
    pub channels: Vec<ReminderChannel>,
}

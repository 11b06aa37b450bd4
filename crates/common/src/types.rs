use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Unique identifier for tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for events, generated at the publish site.
/// Consumers deduplicate on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a live WebSocket session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Recurrence cadence of a recurring task. Present iff `is_recurring`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Notification channel carried on reminder events. Delivery adapters live
/// outside this engine; the names pass through untouched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReminderChannel {
    Push,
    Email,
    Console,
}

/// Lifecycle state of a reminder job. Transitions are one-shot:
/// scheduled -> fired | cancelled | failed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReminderStatus {
    Scheduled,
    Fired,
    Cancelled,
    Failed,
}

/// Append-only audit row, one per consumed event. Deduplicated on
/// `event_id`; never mutated after the append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: EventId,
    pub user_id: UserId,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub prior_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Stored reminder job tuple mirrored from the external job facility.
/// Keyed by task so a reschedule replaces the previous registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJob {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub fire_at: DateTime<Utc>,
    pub channels: Vec<ReminderChannel>,
    pub status: ReminderStatus,
}

/// The authoritative task row.
///
/// All timestamps are timezone-aware UTC. `is_recurring` holds exactly when
/// `recurrence_pattern` is set. Lineage fields are written once: the parent's
/// `next_occurrence_id` by the recurrence worker, `parent_task_id` at insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub is_completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub remind_at: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub parent_task_id: Option<TaskId>,
    pub next_occurrence_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Signed reminder offset `due_date - remind_at`, when both are set.
    /// Preserved across recurrence; may be negative for reminders after due.
    pub fn reminder_offset(&self) -> Option<chrono::Duration> {
        match (self.due_date, self.remind_at) {
            (Some(due), Some(remind)) => Some(due - remind),
            _ => None,
        }
    }
}

//! Persistence seams consumed by the engine components.
//!
//! The engine holds trait objects, never concrete stores, so the recurrence
//! and gateway logic can be exercised against in-memory fakes while
//! production wires in the Postgres implementations from this crate.

use async_trait::async_trait;
use tasklane_common::{
    AuditRecord, ReminderJob, ReminderStatus, Result, Task, TaskId, UserId,
};

/// Result of attempting to materialize a recurrence successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessorOutcome {
    /// Successor inserted and parent linked in the same transaction
    Created,
    /// Another delivery already created the successor; its id is returned
    AlreadyLinked(TaskId),
    /// The parent row is gone (tombstoned or never existed)
    ParentMissing,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<()>;

    /// Fetch a live (non-tombstoned) task regardless of owner. Used by
    /// consumers, which trust the event's provenance.
    async fn fetch(&self, task_id: TaskId) -> Result<Option<Task>>;

    /// Fetch a live task only if owned by `user_id`. A miss and a
    /// foreign-owned task are indistinguishable to the caller.
    async fn fetch_owned(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>>;

    /// Live tasks of one user, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Task>>;

    /// Persist content mutations (title, description, priority, tags,
    /// scheduling fields) of an existing row.
    async fn update_content(&self, task: &Task) -> Result<()>;

    /// Flip `is_completed` under a row lock; concurrent toggles serialize
    /// and the second sees the first's state. Returns the updated row.
    async fn toggle_completed(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>>;

    /// Tombstone the row. Returns the state prior to deletion.
    async fn tombstone(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>>;

    /// Atomically insert `successor` and set the parent's
    /// `next_occurrence_id`, guarded by a lock on the parent row. The
    /// null-check on `next_occurrence_id` inside that lock is what makes
    /// redelivered completion events idempotent.
    async fn create_successor(&self, parent_id: TaskId, successor: &Task)
        -> Result<SuccessorOutcome>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record. Returns false when a record with the same
    /// `event_id` already exists (redelivered event).
    async fn append(&self, record: &AuditRecord) -> Result<bool>;

    /// Most recently recorded `new_state` for an entity, used as the next
    /// record's `prior_state`.
    async fn latest_state(&self, entity_id: uuid::Uuid) -> Result<Option<serde_json::Value>>;
}

#[async_trait]
pub trait ReminderMirror: Send + Sync {
    /// Insert or replace the mirror row for this task, resetting its status
    /// to `scheduled`.
    async fn upsert(&self, job: &ReminderJob) -> Result<()>;

    async fn get(&self, task_id: TaskId) -> Result<Option<ReminderJob>>;

    /// One-shot transition out of `scheduled`. Returns false when the job
    /// had already left the scheduled state.
    async fn mark(&self, task_id: TaskId, status: ReminderStatus) -> Result<bool>;

    /// All still-scheduled jobs ordered by fire instant, for the recovery
    /// scan after a restart.
    async fn scheduled_jobs(&self) -> Result<Vec<ReminderJob>>;
}

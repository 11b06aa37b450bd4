use crate::recurrence::schedule::{next_due_date, next_remind_at};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tasklane_common::{
    topics, EventEnvelope, EventType, ReminderChannel, Task, TaskId,
};
use tasklane_messaging::{EventHandler, EventPublisher, Outcome};
use tasklane_storage::{SuccessorOutcome, TaskRepository};
use tracing::{debug, error, info, instrument, warn};

/// Consumes `task.completed` events and creates the successor occurrence
/// exactly once per parent, no matter how many times the event is delivered.
///
/// The parent row is always re-fetched; nothing is computed from the event
/// payload, which may be stale by the time the broker redelivers it.
pub struct RecurrenceWorker {
    tasks: Arc<dyn TaskRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl RecurrenceWorker {
    pub fn new(tasks: Arc<dyn TaskRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { tasks, publisher }
    }

    fn build_successor(parent: &Task) -> Option<Task> {
        let pattern = parent.recurrence_pattern?;

        // Anchor: the parent's due date when present, otherwise now. The
        // DateTime<Utc> type rules out timezone-naive values by construction.
        let anchor = parent.due_date.unwrap_or_else(Utc::now);
        let new_due = next_due_date(anchor, pattern)?;
        let new_remind = parent
            .remind_at
            .and_then(|_| next_remind_at(parent, new_due, pattern));

        let now = Utc::now();
        Some(Task {
            id: TaskId::new(),
            user_id: parent.user_id,
            title: parent.title.clone(),
            description: parent.description.clone(),
            priority: parent.priority,
            tags: parent.tags.clone(),
            is_completed: false,
            due_date: Some(new_due),
            remind_at: new_remind,
            is_recurring: true,
            recurrence_pattern: Some(pattern),
            parent_task_id: Some(parent.id),
            next_occurrence_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Emit the derived events for a freshly created successor. Failures are
    /// logged and swallowed: returning RETRY here would redeliver the
    /// completion event and the successor row already exists.
    async fn announce(&self, successor: &Task) {
        let created = EventEnvelope::task_event(EventType::TaskCreated, successor, None);
        for topic in [topics::TASK_EVENTS, topics::TASK_UPDATES] {
            if let Err(e) = self.publisher.publish(topic, &created).await {
                error!(
                    task_id = %successor.id,
                    topic,
                    error = %e,
                    "Failed to announce recurrence successor; consumers will lag until replay"
                );
            }
        }

        if let Some(remind_at) = successor.remind_at {
            let scheduled = EventEnvelope::reminder_scheduled(
                successor,
                remind_at,
                vec![ReminderChannel::Console],
            );
            if let Err(e) = self.publisher.publish(topics::REMINDERS, &scheduled).await {
                error!(
                    task_id = %successor.id,
                    error = %e,
                    "Failed to request reminder for recurrence successor"
                );
            }
        }
    }
}

#[async_trait]
impl EventHandler for RecurrenceWorker {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.event_id, task_id = %envelope.task_id))]
    async fn handle(&self, envelope: EventEnvelope) -> Outcome {
        if envelope.event_type != EventType::TaskCompleted {
            return Outcome::Success;
        }

        let parent = match self.tasks.fetch(envelope.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("Completed task no longer exists; nothing to recur");
                return Outcome::Success;
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch parent task");
                return Outcome::Retry;
            }
        };

        if !parent.is_recurring || parent.recurrence_pattern.is_none() {
            return Outcome::Success;
        }
        if let Some(existing) = parent.next_occurrence_id {
            debug!(successor_id = %existing, "Successor already linked");
            return Outcome::Success;
        }

        let Some(successor) = Self::build_successor(&parent) else {
            warn!("Recurrence arithmetic produced no next instant");
            return Outcome::Success;
        };

        match self.tasks.create_successor(parent.id, &successor).await {
            Ok(SuccessorOutcome::Created) => {
                info!(
                    successor_id = %successor.id,
                    due_date = ?successor.due_date,
                    "Created next occurrence"
                );
                self.announce(&successor).await;
                Outcome::Success
            }
            Ok(SuccessorOutcome::AlreadyLinked(existing)) => {
                debug!(successor_id = %existing, "Redelivered completion; successor exists");
                Outcome::Success
            }
            Ok(SuccessorOutcome::ParentMissing) => {
                debug!("Parent tombstoned before recurrence ran");
                Outcome::Success
            }
            Err(e) => {
                error!(error = %e, "Failed to persist successor; requesting redelivery");
                Outcome::Retry
            }
        }
    }
}

//! Task Mutation Gateway: validates mutations, persists them, and emits the
//! canonical events. The database write always commits before any publish;
//! a failed publish is logged loudly and never rolls the mutation back.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tasklane_common::{
    topics, EngineError, EventEnvelope, EventType, Priority, RecurrencePattern,
    ReminderChannel, Result, Task, TaskId, UserId,
};
use tasklane_messaging::{EventPublisher, PublishError};
use tasklane_storage::TaskRepository;
use tracing::{error, info, instrument, warn};

const MAX_TITLE_GLYPHS: usize = 255;
const MAX_DESCRIPTION_GLYPHS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remind_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence_pattern: Option<RecurrencePattern>,
    #[serde(default)]
    pub reminder_channels: Option<Vec<ReminderChannel>>,
}

/// Content update; absent fields keep their current value. Clearable fields
/// use a double Option: absent = untouched, explicit null = cleared.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub remind_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub recurrence_pattern: Option<Option<RecurrencePattern>>,
}

/// Wraps a present-but-possibly-null JSON field in the outer Some.
fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub struct TaskGateway {
    tasks: Arc<dyn TaskRepository>,
    publisher: Arc<dyn EventPublisher>,
    /// Publishes skipped because the pub/sub component is not configured;
    /// surfaced on the health endpoint for operators.
    misconfigured_publishes: AtomicU64,
}

impl TaskGateway {
    pub fn new(tasks: Arc<dyn TaskRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            tasks,
            publisher,
            misconfigured_publishes: AtomicU64::new(0),
        }
    }

    pub fn misconfigured_publish_count(&self) -> u64 {
        self.misconfigured_publishes.load(Ordering::Relaxed)
    }

    #[instrument(skip(self, request), fields(user_id = %principal))]
    pub async fn create(&self, principal: UserId, request: CreateTaskRequest) -> Result<Task> {
        validate_title(&request.title)?;
        validate_description(request.description.as_deref())?;

        let now = Utc::now();
        let task = Task {
            id: TaskId::new(),
            user_id: principal,
            title: request.title,
            description: request.description,
            priority: request.priority,
            tags: request.tags,
            is_completed: false,
            due_date: request.due_date,
            remind_at: request.remind_at,
            is_recurring: request.recurrence_pattern.is_some(),
            recurrence_pattern: request.recurrence_pattern,
            parent_task_id: None,
            next_occurrence_id: None,
            created_at: now,
            updated_at: now,
        };

        self.tasks.insert(&task).await?;
        info!(task_id = %task.id, "Task created");

        let envelope = EventEnvelope::task_event(EventType::TaskCreated, &task, None);
        self.publish_to(topics::TASK_EVENTS, &envelope).await;
        self.publish_to(topics::TASK_UPDATES, &envelope).await;

        if let Some(remind_at) = task.remind_at {
            let channels = request
                .reminder_channels
                .unwrap_or_else(|| vec![ReminderChannel::Console]);
            let scheduled = EventEnvelope::reminder_scheduled(&task, remind_at, channels);
            self.publish_to(topics::REMINDERS, &scheduled).await;
        }

        Ok(task)
    }

    #[instrument(skip(self, request), fields(user_id = %principal, task_id = %task_id))]
    pub async fn update(
        &self,
        principal: UserId,
        task_id: TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Task> {
        let mut task = self
            .tasks
            .fetch_owned(task_id, principal)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))?;

        let mut changed: Vec<String> = Vec::new();

        if let Some(title) = request.title {
            validate_title(&title)?;
            if title != task.title {
                task.title = title;
                changed.push("title".to_string());
            }
        }
        if let Some(description) = request.description {
            validate_description(description.as_deref())?;
            if description != task.description {
                task.description = description;
                changed.push("description".to_string());
            }
        }
        if let Some(priority) = request.priority {
            if priority != task.priority {
                task.priority = priority;
                changed.push("priority".to_string());
            }
        }
        if let Some(tags) = request.tags {
            if tags != task.tags {
                task.tags = tags;
                changed.push("tags".to_string());
            }
        }
        if let Some(due_date) = request.due_date {
            if due_date != task.due_date {
                task.due_date = due_date;
                changed.push("due_date".to_string());
            }
        }
        if let Some(remind_at) = request.remind_at {
            if remind_at != task.remind_at {
                task.remind_at = remind_at;
                changed.push("remind_at".to_string());
            }
        }
        if let Some(pattern) = request.recurrence_pattern {
            if pattern != task.recurrence_pattern {
                task.recurrence_pattern = pattern;
                task.is_recurring = pattern.is_some();
                changed.push("recurrence_pattern".to_string());
            }
        }

        if changed.is_empty() {
            return Ok(task);
        }

        task.updated_at = Utc::now();
        self.tasks.update_content(&task).await?;
        info!(changed = ?changed, "Task updated");

        let envelope = EventEnvelope::task_event(EventType::TaskUpdated, &task, Some(changed));
        self.publish_to(topics::TASK_EVENTS, &envelope).await;
        self.publish_to(topics::TASK_UPDATES, &envelope).await;

        Ok(task)
    }

    /// Toggle completion. Concurrent toggles on one task serialize on the
    /// row lock; the second caller sees the first's state and flips it back.
    #[instrument(skip(self), fields(user_id = %principal, task_id = %task_id))]
    pub async fn toggle_complete(&self, principal: UserId, task_id: TaskId) -> Result<Task> {
        let task = self
            .tasks
            .toggle_completed(task_id, principal)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))?;

        let (event_type, changed) = if task.is_completed {
            (EventType::TaskCompleted, None)
        } else {
            (
                EventType::TaskUpdated,
                Some(vec!["is_completed".to_string()]),
            )
        };
        info!(completed = task.is_completed, "Task completion toggled");

        let envelope = EventEnvelope::task_event(event_type, &task, changed);
        self.publish_to(topics::TASK_EVENTS, &envelope).await;
        self.publish_to(topics::TASK_UPDATES, &envelope).await;

        Ok(task)
    }

    #[instrument(skip(self), fields(user_id = %principal, task_id = %task_id))]
    pub async fn delete(&self, principal: UserId, task_id: TaskId) -> Result<Task> {
        let task = self
            .tasks
            .tombstone(task_id, principal)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))?;
        info!("Task deleted");

        let envelope = EventEnvelope::task_event(EventType::TaskDeleted, &task, None);
        self.publish_to(topics::TASK_EVENTS, &envelope).await;
        self.publish_to(topics::TASK_UPDATES, &envelope).await;

        Ok(task)
    }

    pub async fn get(&self, principal: UserId, task_id: TaskId) -> Result<Task> {
        self.tasks
            .fetch_owned(task_id, principal)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))
    }

    pub async fn list(&self, principal: UserId) -> Result<Vec<Task>> {
        self.tasks.list_for_user(principal).await
    }

    /// Best-effort publish: the mutation already committed, so derived work
    /// failing must not surface to the caller.
    async fn publish_to(&self, topic: &str, envelope: &EventEnvelope) {
        match self.publisher.publish(topic, envelope).await {
            Ok(()) => {}
            Err(e @ PublishError::Misconfigured { .. }) => {
                self.misconfigured_publishes.fetch_add(1, Ordering::Relaxed);
                error!(
                    topic,
                    event_id = %envelope.event_id,
                    error = %e,
                    "Event dropped: pub/sub component not configured"
                );
            }
            Err(e) => {
                warn!(
                    topic,
                    event_id = %envelope.event_id,
                    error = %e,
                    "Event dropped after retries; downstream consumers will miss it"
                );
            }
        }
    }
}

fn validate_title(title: &str) -> Result<()> {
    let glyphs = title.chars().count();
    if glyphs == 0 || title.trim().is_empty() {
        return Err(EngineError::Validation("title must not be empty".into()));
    }
    if glyphs > MAX_TITLE_GLYPHS {
        return Err(EngineError::Validation(format!(
            "title exceeds {MAX_TITLE_GLYPHS} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(description) = description {
        if description.chars().count() > MAX_DESCRIPTION_GLYPHS {
            return Err(EngineError::Validation(format!(
                "description exceeds {MAX_DESCRIPTION_GLYPHS} characters"
            )));
        }
    }
    Ok(())
}

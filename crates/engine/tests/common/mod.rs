//! In-memory doubles for the engine's injected seams
#![allow(dead_code)] // not every suite uses every fake

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tasklane_common::{
    AuditRecord, EngineError, EventEnvelope, ReminderJob, ReminderStatus, Result, Task, TaskId,
    UserId,
};
use tasklane_messaging::jobs::ReminderJobData;
use tasklane_messaging::{EventPublisher, JobScheduler, PublishError, PublishResult};
use tasklane_storage::{AuditLog, ReminderMirror, SuccessorOutcome, TaskRepository};

#[derive(Default)]
pub struct InMemoryTaskRepository {
    rows: Mutex<HashMap<TaskId, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, task: Task) {
        self.rows.lock().unwrap().insert(task.id, task);
    }

    pub fn get(&self, task_id: TaskId) -> Option<Task> {
        self.rows.lock().unwrap().get(&task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn set_completed(&self, task_id: TaskId, completed: bool) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(task) = rows.get_mut(&task_id) {
            task.is_completed = completed;
        }
    }

}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert(&self, task: &Task) -> Result<()> {
        self.rows.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn fetch(&self, task_id: TaskId) -> Result<Option<Task>> {
        Ok(self.rows.lock().unwrap().get(&task_id).cloned())
    }

    async fn fetch_owned(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&task_id)
            .filter(|task| task.user_id == user_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn update_content(&self, task: &Task) -> Result<()> {
        self.rows.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn toggle_completed(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&task_id) {
            Some(task) if task.user_id == user_id => {
                task.is_completed = !task.is_completed;
                task.updated_at = Utc::now();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn tombstone(&self, task_id: TaskId, user_id: UserId) -> Result<Option<Task>> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&task_id) {
            Some(task) if task.user_id == user_id => {
                let prior = task.clone();
                rows.remove(&task_id);
                Ok(Some(prior))
            }
            _ => Ok(None),
        }
    }

    async fn create_successor(
        &self,
        parent_id: TaskId,
        successor: &Task,
    ) -> Result<SuccessorOutcome> {
        let mut rows = self.rows.lock().unwrap();
        let Some(parent) = rows.get(&parent_id).cloned() else {
            return Ok(SuccessorOutcome::ParentMissing);
        };
        if let Some(existing) = parent.next_occurrence_id {
            return Ok(SuccessorOutcome::AlreadyLinked(existing));
        }
        rows.insert(successor.id, successor.clone());
        rows.get_mut(&parent_id).unwrap().next_occurrence_id = Some(successor.id);
        Ok(SuccessorOutcome::Created)
    }
}

/// Records every publish; can be switched into failure modes.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, EventEnvelope)>>,
    fail_transient: AtomicBool,
    fail_misconfigured: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_transient(&self, fail: bool) {
        self.fail_transient.store(fail, Ordering::SeqCst);
    }

    pub fn fail_misconfigured(&self, fail: bool) {
        self.fail_misconfigured.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.events.lock().unwrap().clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> PublishResult<()> {
        if self.fail_misconfigured.load(Ordering::SeqCst) {
            return Err(PublishError::Misconfigured {
                component: "pubsub".to_string(),
                endpoint: format!("http://127.0.0.1:3500/publish/pubsub/{topic}"),
            });
        }
        if self.fail_transient.load(Ordering::SeqCst) {
            return Err(PublishError::Transient("connection refused".to_string()));
        }
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), envelope.clone()));
        Ok(())
    }
}

/// Fake job facility recording registrations and cancellations
#[derive(Default)]
pub struct FakeJobFacility {
    registered: Mutex<HashMap<TaskId, ReminderJobData>>,
    cancelled: Mutex<Vec<TaskId>>,
}

impl FakeJobFacility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered_job(&self, task_id: TaskId) -> Option<ReminderJobData> {
        self.registered.lock().unwrap().get(&task_id).cloned()
    }

    pub fn registered_count(&self) -> usize {
        self.registered.lock().unwrap().len()
    }

    pub fn cancelled_tasks(&self) -> Vec<TaskId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScheduler for FakeJobFacility {
    async fn register(&self, job: &ReminderJobData) -> PublishResult<()> {
        self.registered
            .lock()
            .unwrap()
            .insert(job.task_id, job.clone());
        Ok(())
    }

    async fn cancel(&self, task_id: TaskId) -> PublishResult<()> {
        self.registered.lock().unwrap().remove(&task_id);
        self.cancelled.lock().unwrap().push(task_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryReminderMirror {
    jobs: Mutex<HashMap<TaskId, ReminderJob>>,
}

impl InMemoryReminderMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, task_id: TaskId) -> Option<ReminderStatus> {
        self.jobs.lock().unwrap().get(&task_id).map(|job| job.status)
    }

    pub fn seed(&self, job: ReminderJob) {
        self.jobs.lock().unwrap().insert(job.task_id, job);
    }
}

#[async_trait]
impl ReminderMirror for InMemoryReminderMirror {
    async fn upsert(&self, job: &ReminderJob) -> Result<()> {
        let mut stored = job.clone();
        stored.status = ReminderStatus::Scheduled;
        self.jobs.lock().unwrap().insert(job.task_id, stored);
        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<ReminderJob>> {
        Ok(self.jobs.lock().unwrap().get(&task_id).cloned())
    }

    async fn mark(&self, task_id: TaskId, status: ReminderStatus) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&task_id) {
            Some(job) if job.status == ReminderStatus::Scheduled => {
                job.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scheduled_jobs(&self) -> Result<Vec<ReminderJob>> {
        let mut jobs: Vec<ReminderJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.status == ReminderStatus::Scheduled)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.fire_at);
        Ok(jobs)
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    rows: Mutex<Vec<AuditRecord>>,
    fail_appends: AtomicBool,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<AuditRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: &AuditRecord) -> Result<bool> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(EngineError::Database("append failed".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.event_id == record.event_id) {
            return Ok(false);
        }
        rows.push(record.clone());
        Ok(true)
    }

    async fn latest_state(
        &self,
        entity_id: uuid::Uuid,
    ) -> Result<Option<serde_json::Value>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.entity_id == entity_id)
            .and_then(|r| r.new_state.clone()))
    }
}

/// A recurring task fixture builder used across the suites
pub fn recurring_task(
    user_id: UserId,
    due: Option<chrono::DateTime<Utc>>,
    remind: Option<chrono::DateTime<Utc>>,
    pattern: tasklane_common::RecurrencePattern,
) -> Task {
    let now = Utc::now();
    Task {
        id: TaskId::new(),
        user_id,
        title: "standup notes".to_string(),
        description: Some("prepare the notes".to_string()),
        priority: tasklane_common::Priority::High,
        tags: vec!["work".to_string()],
        is_completed: false,
        due_date: due,
        remind_at: remind,
        is_recurring: true,
        recurrence_pattern: Some(pattern),
        parent_task_id: None,
        next_occurrence_id: None,
        created_at: now,
        updated_at: now,
    }
}

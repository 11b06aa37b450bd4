//! Reminder Scheduler: registers exact-time jobs with the external job
//! facility and publishes `reminder.fired` when they trigger.
//!
//! Jobs are keyed by task id, so re-registering replaces the previous
//! trigger. The facility persists jobs across restarts; the mirror table
//! additionally lets a restarted scheduler re-register anything that was
//! still pending (`recover`).

use chrono::Utc;
use std::sync::Arc;
use tasklane_common::{
    topics, EventEnvelope, EventType, ReminderChannel, ReminderJob, ReminderStatus, Result,
    TaskId,
};
use tasklane_messaging::jobs::ReminderJobData;
use tasklane_messaging::{EventPublisher, JobScheduler, Outcome};
use tasklane_storage::{ReminderMirror, TaskRepository};
use tracing::{debug, error, info, instrument, warn};

pub struct ReminderScheduler {
    tasks: Arc<dyn TaskRepository>,
    mirror: Arc<dyn ReminderMirror>,
    jobs: Arc<dyn JobScheduler>,
    publisher: Arc<dyn EventPublisher>,
    /// Acceptable positive latency between the scheduled instant and the
    /// actual fire; anything beyond is logged for the operator.
    variance_budget: chrono::Duration,
}

impl ReminderScheduler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        mirror: Arc<dyn ReminderMirror>,
        jobs: Arc<dyn JobScheduler>,
        publisher: Arc<dyn EventPublisher>,
        variance_budget_ms: u64,
    ) -> Self {
        Self {
            tasks,
            mirror,
            jobs,
            publisher,
            variance_budget: chrono::Duration::milliseconds(variance_budget_ms as i64),
        }
    }

    /// Consume the `reminders` topic. Only `reminder.scheduled` carries a
    /// request; `reminder.fired` is our own output echoed back.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.event_id, task_id = %envelope.task_id))]
    pub async fn handle_reminder_event(&self, envelope: EventEnvelope) -> Outcome {
        if envelope.event_type != EventType::ReminderScheduled {
            return Outcome::Success;
        }

        let payload = match envelope.reminder_scheduled_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Malformed reminder.scheduled payload; dropping");
                return Outcome::Drop;
            }
        };

        let job = ReminderJobData {
            task_id: envelope.task_id,
            user_id: envelope.user_id,
            fire_at: payload.fire_at,
            channels: payload.channels,
        };
        self.register(job).await
    }

    /// Consume `task-events` for cancellation: deletion always cancels,
    /// completion cancels for non-recurring tasks (the recurrence worker
    /// schedules the successor's own reminder), and a changed `remind_at`
    /// cancels and re-registers.
    #[instrument(skip(self, envelope), fields(event_id = %envelope.event_id, task_id = %envelope.task_id))]
    pub async fn handle_task_event(&self, envelope: EventEnvelope) -> Outcome {
        match envelope.event_type {
            EventType::TaskDeleted => self.cancel(envelope.task_id).await,
            EventType::TaskCompleted => {
                match self.tasks.fetch(envelope.task_id).await {
                    // Recurring completions hand off to the successor's
                    // reminder; nothing to cancel here.
                    Ok(Some(task)) if task.is_recurring => Outcome::Success,
                    Ok(_) => self.cancel(envelope.task_id).await,
                    Err(e) => {
                        error!(error = %e, "Failed to fetch task for reminder cancellation");
                        Outcome::Retry
                    }
                }
            }
            EventType::TaskUpdated => {
                let changed_remind = envelope
                    .task_payload()
                    .ok()
                    .and_then(|p| p.changed_fields)
                    .map(|fields| fields.iter().any(|f| f == "remind_at"))
                    .unwrap_or(false);
                if !changed_remind {
                    return Outcome::Success;
                }

                let task = match self.tasks.fetch(envelope.task_id).await {
                    Ok(Some(task)) => task,
                    Ok(None) => return self.cancel(envelope.task_id).await,
                    Err(e) => {
                        error!(error = %e, "Failed to fetch task for reminder reschedule");
                        return Outcome::Retry;
                    }
                };

                match task.remind_at {
                    Some(remind_at) => {
                        let channels = self.existing_channels(task.id).await;
                        self.register(ReminderJobData {
                            task_id: task.id,
                            user_id: task.user_id,
                            fire_at: remind_at,
                            channels,
                        })
                        .await
                    }
                    None => self.cancel(task.id).await,
                }
            }
            _ => Outcome::Success,
        }
    }

    /// Callback from the job facility when a registered trigger elapses.
    #[instrument(skip(self, job), fields(task_id = %job.task_id, fire_at = %job.fire_at))]
    pub async fn fire(&self, job: ReminderJobData) -> Outcome {
        // One-shot gate: a redelivered trigger for a job that already left
        // the scheduled state is acknowledged without a second notification.
        match self.mirror.get(job.task_id).await {
            Ok(Some(mirrored)) if mirrored.status != ReminderStatus::Scheduled => {
                debug!(status = %mirrored.status, "Reminder already settled; ignoring trigger");
                return Outcome::Success;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to read reminder mirror");
                return Outcome::Retry;
            }
        }

        let task = match self.tasks.fetch(job.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("Task gone before its reminder fired");
                let _ = self.mirror.mark(job.task_id, ReminderStatus::Cancelled).await;
                return Outcome::Success;
            }
            Err(e) => {
                error!(error = %e, "Failed to load task snapshot for reminder");
                return Outcome::Retry;
            }
        };

        let lateness = Utc::now() - job.fire_at;
        if lateness > self.variance_budget {
            warn!(
                lateness_ms = lateness.num_milliseconds(),
                "Reminder firing outside the variance budget"
            );
        }

        let envelope = EventEnvelope::reminder_fired(&task, job.fire_at, job.channels.clone());
        if let Err(e) = self.publisher.publish(topics::REMINDERS, &envelope).await {
            if e.is_misconfigured() {
                error!(error = %e, "Cannot publish reminder.fired; marking failed");
                let _ = self.mirror.mark(job.task_id, ReminderStatus::Failed).await;
                return Outcome::Drop;
            }
            warn!(error = %e, "Transient failure publishing reminder.fired; will retry");
            return Outcome::Retry;
        }

        if let Err(e) = self.mirror.mark(job.task_id, ReminderStatus::Fired).await {
            // The notification went out; a stale mirror row is log-worthy
            // but not worth a duplicate fire.
            error!(error = %e, "Reminder fired but mirror not updated");
        }
        info!("Reminder fired");
        Outcome::Success
    }

    /// Re-register every still-scheduled job after a restart. Past-due jobs
    /// fire immediately.
    pub async fn recover(&self) -> Result<usize> {
        let pending = self.mirror.scheduled_jobs().await?;
        let count = pending.len();
        for job in pending {
            let data = ReminderJobData {
                task_id: job.task_id,
                user_id: job.user_id,
                fire_at: job.fire_at,
                channels: job.channels,
            };
            match self.register(data).await {
                Outcome::Success => {}
                outcome => warn!(task_id = %job.task_id, ?outcome, "Recovery registration incomplete"),
            }
        }
        if count > 0 {
            info!(count, "Recovered pending reminder jobs");
        }
        Ok(count)
    }

    async fn register(&self, job: ReminderJobData) -> Outcome {
        let mirrored = ReminderJob {
            task_id: job.task_id,
            user_id: job.user_id,
            fire_at: job.fire_at,
            channels: job.channels.clone(),
            status: ReminderStatus::Scheduled,
        };
        if let Err(e) = self.mirror.upsert(&mirrored).await {
            error!(error = %e, "Failed to mirror reminder job");
            return Outcome::Retry;
        }

        // A fire instant already in the past fires right away instead of
        // being handed to the facility.
        if job.fire_at <= Utc::now() {
            debug!("Registration is past due; firing immediately");
            return self.fire(job).await;
        }

        if let Err(e) = self.jobs.register(&job).await {
            error!(error = %e, "Failed to register job with the facility");
            return Outcome::Retry;
        }
        debug!("Reminder job registered");
        Outcome::Success
    }

    async fn cancel(&self, task_id: TaskId) -> Outcome {
        if let Err(e) = self.jobs.cancel(task_id).await {
            error!(error = %e, "Failed to cancel job with the facility");
            return Outcome::Retry;
        }
        if let Err(e) = self.mirror.mark(task_id, ReminderStatus::Cancelled).await {
            error!(error = %e, "Failed to mark reminder cancelled");
            return Outcome::Retry;
        }
        debug!(task_id = %task_id, "Reminder cancelled");
        Outcome::Success
    }

    async fn existing_channels(&self, task_id: TaskId) -> Vec<ReminderChannel> {
        match self.mirror.get(task_id).await {
            Ok(Some(job)) if !job.channels.is_empty() => job.channels,
            _ => vec![ReminderChannel::Console],
        }
    }
}

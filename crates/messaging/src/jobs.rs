//! Exact-time job registration on the sidecar's job facility
//!
//! Jobs are keyed `reminder-<task_id>` so re-registering a task's reminder
//! replaces the previous trigger instead of stacking a second one. The
//! facility persists jobs across engine restarts; on fire it POSTs the stored
//! payload back to the job-trigger route.

use crate::error::{PublishError, PublishResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tasklane_common::{sidecar_http_port, ReminderChannel, TaskId, UserId};
use tracing::{debug, instrument, warn};

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_SECS: [u64; 3] = [1, 2, 4];

/// Payload stored with the job and posted back on fire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJobData {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub fire_at: DateTime<Utc>,
    pub channels: Vec<ReminderChannel>,
}

#[derive(Debug, Serialize)]
struct RegisterJobBody<'a> {
    due_time: DateTime<Utc>,
    data: &'a ReminderJobData,
}

/// Seam over the external job facility so the scheduler can be exercised
/// without a sidecar.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Register (or replace) the one-shot job for this task
    async fn register(&self, job: &ReminderJobData) -> PublishResult<()>;
    /// Cancel the pending job for this task, if any
    async fn cancel(&self, task_id: TaskId) -> PublishResult<()>;
}

/// HTTP client for `http://127.0.0.1:<port>/jobs/<name>`. The port is
/// re-read from the environment per call, same as the publish path.
#[derive(Debug, Clone)]
pub struct SidecarJobsClient {
    client: Client,
}

impl SidecarJobsClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn job_endpoint(task_id: TaskId) -> String {
        format!(
            "http://127.0.0.1:{}/jobs/reminder-{}",
            sidecar_http_port(),
            task_id
        )
    }

    async fn send_with_retry<F>(&self, describe: &str, send: F) -> PublishResult<()>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err: Option<PublishError> = None;

        for attempt in 0..=BACKOFF_SECS.len() {
            let result = send().send().await;
            match result {
                Ok(response) if response.status().is_success() => return Ok(()),
                // A job that is already gone is a successful cancellation.
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(()),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    last_err = Some(PublishError::Transient(format!(
                        "{describe}: job facility returned {status}: {body}"
                    )));
                }
                Err(e) => {
                    last_err = Some(PublishError::Transient(format!(
                        "{describe}: job facility unreachable: {e}"
                    )));
                }
            }

            if let Some(backoff) = BACKOFF_SECS.get(attempt) {
                warn!(attempt = attempt + 1, "{describe} failed, backing off");
                tokio::time::sleep(Duration::from_secs(*backoff)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| PublishError::Transient(format!("{describe} failed"))))
    }
}

#[async_trait]
impl JobScheduler for SidecarJobsClient {
    #[instrument(skip(self, job), fields(task_id = %job.task_id, fire_at = %job.fire_at))]
    async fn register(&self, job: &ReminderJobData) -> PublishResult<()> {
        self.send_with_retry("register job", || {
            let endpoint = Self::job_endpoint(job.task_id);
            let body = RegisterJobBody {
                due_time: job.fire_at,
                data: job,
            };
            self.client.post(endpoint).json(&body)
        })
        .await?;

        debug!("Reminder job registered");
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn cancel(&self, task_id: TaskId) -> PublishResult<()> {
        self.send_with_retry("cancel job", || {
            self.client.delete(Self::job_endpoint(task_id))
        })
        .await?;

        debug!("Reminder job cancelled");
        Ok(())
    }
}

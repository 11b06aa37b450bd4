//! Integration tests for the job facility client

use serial_test::serial;
use tasklane_messaging::jobs::ReminderJobData;
use tasklane_messaging::{JobScheduler, SidecarJobsClient};
use tasklane_common::{ReminderChannel, TaskId, UserId, ENV_SIDECAR_HTTP_PORT};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn point_sidecar_at(server: &MockServer) {
    let port = server.address().port();
    std::env::set_var(ENV_SIDECAR_HTTP_PORT, port.to_string());
}

#[tokio::test]
#[serial]
async fn register_posts_job_keyed_by_task_id() {
    let server = MockServer::start().await;
    point_sidecar_at(&server);

    let job = ReminderJobData {
        task_id: TaskId::new(),
        user_id: UserId::new(),
        fire_at: chrono::Utc::now() + chrono::Duration::hours(1),
        channels: vec![ReminderChannel::Push, ReminderChannel::Console],
    };

    Mock::given(method("POST"))
        .and(path(format!("/jobs/reminder-{}", job.task_id)))
        .and(body_string_contains("due_time"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = SidecarJobsClient::new().unwrap();
    client.register(&job).await.unwrap();
}

#[tokio::test]
#[serial]
async fn cancel_deletes_job_and_tolerates_missing_job() {
    let server = MockServer::start().await;
    point_sidecar_at(&server);

    let task_id = TaskId::new();
    Mock::given(method("DELETE"))
        .and(path(format!("/jobs/reminder-{}", task_id)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    // A job that already fired or was never registered is not an error.
    let client = SidecarJobsClient::new().unwrap();
    client.cancel(task_id).await.unwrap();
}

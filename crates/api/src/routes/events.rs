//! Sidecar event delivery routes, one per topic, plus the job trigger
//! callback.
//!
//! Each route fans the envelope through every internal consumer of that
//! topic and answers with the worst outcome: any RETRY wins (consumers are
//! idempotent, so reprocessing the others is harmless), then DROP, then
//! SUCCESS. A body that does not parse as an envelope is poisoned and
//! dropped, never retried.

use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::{extract::State, response::Json};
use std::future::Future;
use std::time::Duration;
use tasklane_common::EventEnvelope;
use tasklane_messaging::jobs::ReminderJobData;
use tasklane_messaging::{EventHandler, Outcome, OutcomeBody};
use tracing::{instrument, warn};

/// A consumer that exceeds this deadline has its message handed back to the
/// broker for redelivery.
const HANDLER_DEADLINE: Duration = Duration::from_secs(30);

async fn bounded(handler: impl Future<Output = Outcome>) -> Outcome {
    match tokio::time::timeout(HANDLER_DEADLINE, handler).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("Consumer exceeded its per-message deadline; requesting redelivery");
            Outcome::Retry
        }
    }
}

fn worst(outcomes: impl IntoIterator<Item = Outcome>) -> Outcome {
    let mut combined = Outcome::Success;
    for outcome in outcomes {
        combined = match (combined, outcome) {
            (Outcome::Retry, _) | (_, Outcome::Retry) => Outcome::Retry,
            (Outcome::Drop, _) | (_, Outcome::Drop) => Outcome::Drop,
            _ => Outcome::Success,
        };
    }
    combined
}

fn poisoned(topic: &str, rejection: &JsonRejection) -> Json<OutcomeBody> {
    warn!(topic, error = %rejection, "Undecodable delivery body; dropping as poisoned");
    Json(OutcomeBody::from(Outcome::Drop))
}

#[instrument(skip_all)]
pub async fn deliver_task_event(
    State(state): State<AppState>,
    envelope: Result<Json<EventEnvelope>, JsonRejection>,
) -> Json<OutcomeBody> {
    let Json(envelope) = match envelope {
        Ok(body) => body,
        Err(rejection) => return poisoned("task-events", &rejection),
    };

    let outcome = worst([
        bounded(state.recurrence.handle(envelope.clone())).await,
        bounded(state.scheduler.handle_task_event(envelope.clone())).await,
        bounded(state.audit.handle(envelope)).await,
    ]);
    Json(OutcomeBody::from(outcome))
}

#[instrument(skip_all)]
pub async fn deliver_reminder_event(
    State(state): State<AppState>,
    envelope: Result<Json<EventEnvelope>, JsonRejection>,
) -> Json<OutcomeBody> {
    let Json(envelope) = match envelope {
        Ok(body) => body,
        Err(rejection) => return poisoned("reminders", &rejection),
    };

    let outcome = worst([
        bounded(state.scheduler.handle_reminder_event(envelope.clone())).await,
        bounded(state.audit.handle(envelope)).await,
    ]);
    Json(OutcomeBody::from(outcome))
}

#[instrument(skip_all)]
pub async fn deliver_task_update(
    State(state): State<AppState>,
    envelope: Result<Json<EventEnvelope>, JsonRejection>,
) -> Json<OutcomeBody> {
    let Json(envelope) = match envelope {
        Ok(body) => body,
        Err(rejection) => return poisoned("task-updates", &rejection),
    };

    let outcome = worst([
        bounded(state.fanout.handle(envelope.clone())).await,
        bounded(state.audit.handle(envelope)).await,
    ]);
    Json(OutcomeBody::from(outcome))
}

/// The job facility posts back the payload it stored at registration time.
#[instrument(skip_all)]
pub async fn job_trigger(
    State(state): State<AppState>,
    job: Result<Json<ReminderJobData>, JsonRejection>,
) -> Json<OutcomeBody> {
    let Json(job) = match job {
        Ok(body) => body,
        Err(rejection) => return poisoned("job-trigger", &rejection),
    };

    let outcome = bounded(state.scheduler.fire(job)).await;
    Json(OutcomeBody::from(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_outcome_prefers_retry_over_drop_over_success() {
        assert_eq!(
            worst([Outcome::Success, Outcome::Drop, Outcome::Retry]),
            Outcome::Retry
        );
        assert_eq!(worst([Outcome::Success, Outcome::Drop]), Outcome::Drop);
        assert_eq!(worst([Outcome::Success, Outcome::Success]), Outcome::Success);
        assert_eq!(worst([]), Outcome::Success);
    }
}

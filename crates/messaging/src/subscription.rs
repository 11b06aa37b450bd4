//! Inbound delivery contract: subscription advertisement and handler outcomes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tasklane_common::{topics, EventEnvelope};

/// Routes the sidecar delivers to. Advertised via `GET /subscriptions`;
/// the job-trigger callback is fixed by convention, not advertised.
pub mod routes {
    pub const TASK_EVENTS: &str = "/events/task-events";
    pub const REMINDERS: &str = "/events/reminders";
    pub const TASK_UPDATES: &str = "/events/task-updates";
    pub const JOB_TRIGGER: &str = "/jobs/trigger";
}

/// Processing outcome a consumer hands back to the broker.
///
/// `Success` acknowledges, `Retry` asks for redelivery with broker-defined
/// backoff, `Drop` acknowledges but marks the message poisoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Success,
    Retry,
    Drop,
}

/// Response body the delivery routes return to the sidecar
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutcomeBody {
    pub status: Outcome,
}

impl From<Outcome> for OutcomeBody {
    fn from(status: Outcome) -> Self {
        Self { status }
    }
}

/// One advertised (component, topic, route) triple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub pubsub_component: String,
    pub topic: String,
    pub route: String,
}

/// The full subscription table the sidecar reads at startup
pub fn subscription_table(component: &str) -> Vec<Subscription> {
    [
        (topics::TASK_EVENTS, routes::TASK_EVENTS),
        (topics::REMINDERS, routes::REMINDERS),
        (topics::TASK_UPDATES, routes::TASK_UPDATES),
    ]
    .into_iter()
    .map(|(topic, route)| Subscription {
        pubsub_component: component.to_string(),
        topic: topic.to_string(),
        route: route.to_string(),
    })
    .collect()
}

/// A consumer of delivered envelopes. Implementations must be idempotent:
/// delivery is at-least-once and the same envelope may arrive repeatedly.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope) -> Outcome;
}

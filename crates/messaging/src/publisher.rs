//! Outbound publish path to the sidecar's pub/sub endpoint

use crate::error::{PublishError, PublishResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tasklane_common::{sidecar_http_port, EventEnvelope};
use tracing::{debug, error, info, instrument, warn};

/// Per-attempt deadline for sidecar HTTP calls
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff schedule between failed attempts
const BACKOFF_SECS: [u64; 3] = [1, 2, 4];

/// Body signature the sidecar returns with a 404 when the requested pub/sub
/// component is not configured. Distinguishes "no such component" from a
/// sidecar that is merely still starting up.
const COMPONENT_NOT_FOUND_SIGNATURE: &str = "ERR_PUBSUB_NOT_FOUND";

/// Broker-neutral publish seam. The gateway, recurrence worker, and reminder
/// scheduler hold `Arc<dyn EventPublisher>` so tests can swap in a recorder.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> PublishResult<()>;
}

/// HTTP publisher posting envelopes to
/// `http://127.0.0.1:<port>/publish/<component>/<topic>`.
///
/// The port is re-read from `SIDECAR_HTTP_PORT` on every call: sidecars get
/// restarted and reassigned ports at any time, and a cached port turns into
/// silent publish failures.
#[derive(Debug, Clone)]
pub struct SidecarPublisher {
    client: Client,
    component: String,
}

impl SidecarPublisher {
    pub fn new(component: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        info!(component = %component, "Initialized sidecar publisher");
        Ok(Self { client, component })
    }

    /// Reuse an existing client (shared connection pool across sidecar
    /// consumers). The client must carry a request timeout.
    pub fn with_client(client: Client, component: String) -> Self {
        Self { client, component }
    }

    fn endpoint(&self, topic: &str) -> String {
        format!(
            "http://127.0.0.1:{}/publish/{}/{}",
            sidecar_http_port(),
            self.component,
            topic
        )
    }

    async fn attempt(&self, endpoint: &str, envelope: &EventEnvelope) -> PublishResult<()> {
        let response = self
            .client
            .post(endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|e| PublishError::Transient(format!("sidecar unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && body.contains(COMPONENT_NOT_FOUND_SIGNATURE) {
            return Err(PublishError::Misconfigured {
                component: self.component.clone(),
                endpoint: endpoint.to_string(),
            });
        }

        Err(PublishError::Transient(format!(
            "sidecar returned {status}: {body}"
        )))
    }
}

#[async_trait]
impl EventPublisher for SidecarPublisher {
    #[instrument(skip(self, envelope), fields(topic = %topic, event_id = %envelope.event_id, event_type = %envelope.event_type))]
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> PublishResult<()> {
        let mut last_err: Option<PublishError> = None;

        for attempt in 0..=BACKOFF_SECS.len() {
            // Endpoint rebuilt per attempt so a sidecar restart mid-retry is
            // picked up from the environment.
            let endpoint = self.endpoint(topic);
            match self.attempt(&endpoint, envelope).await {
                Ok(()) => {
                    debug!(endpoint = %endpoint, "Event published");
                    return Ok(());
                }
                Err(e @ PublishError::Misconfigured { .. }) => {
                    error!(error = %e, "Pub/sub component not configured; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        endpoint = %endpoint,
                        error = %e,
                        "Publish attempt failed"
                    );
                    last_err = Some(e);
                    if let Some(backoff) = BACKOFF_SECS.get(attempt) {
                        tokio::time::sleep(Duration::from_secs(*backoff)).await;
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PublishError::Transient("publish failed without attempts".into())))
    }
}

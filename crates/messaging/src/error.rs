use thiserror::Error;

/// Failure modes of an outbound sidecar call.
///
/// `Transient` covers connection refusal, timeouts, and 5xx responses and is
/// retried on the spot. `Misconfigured` means the sidecar answered but does
/// not know the requested pub/sub component; retrying cannot help, so the
/// diagnostic names exactly what the code asked for and where.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(
        "pubsub component '{component}' not found at {endpoint}; \
         check PUBSUB_COMPONENT and the sidecar's component configuration"
    )]
    Misconfigured { component: String, endpoint: String },

    #[error("transient messaging failure: {0}")]
    Transient(String),
}

impl PublishError {
    pub fn is_misconfigured(&self) -> bool {
        matches!(self, Self::Misconfigured { .. })
    }
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

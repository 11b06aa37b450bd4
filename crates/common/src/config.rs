use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable holding the sidecar's local HTTP port. Read on every
/// publish, never cached at startup: a restarted sidecar may come back on a
/// different port.
pub const ENV_SIDECAR_HTTP_PORT: &str = "SIDECAR_HTTP_PORT";
pub const DEFAULT_SIDECAR_HTTP_PORT: u16 = 3500;

pub const ENV_PUBSUB_COMPONENT: &str = "PUBSUB_COMPONENT";
pub const DEFAULT_PUBSUB_COMPONENT: &str = "pubsub";

/// Engine configuration resolved from the environment at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Host the HTTP server binds to
    pub host: String,
    /// Port the HTTP server binds to
    pub port: u16,
    /// PostgreSQL connection string (required)
    pub database_url: String,
    /// HS256 key for bearer-token verification (required)
    pub jwt_signing_key: String,
    /// Pub/sub component name behind the sidecar; swapping the broker is a
    /// configuration change, not a code change
    pub pubsub_component: String,
    /// Acceptable positive latency between a reminder's scheduled instant
    /// and its actual fire instant
    pub reminder_variance_budget_ms: u64,
    /// Per-session outbound buffer capacity for WebSocket fanout
    pub session_outbound_buffer: usize,
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_signing_key =
            std::env::var("JWT_SIGNING_KEY").context("JWT_SIGNING_KEY must be set")?;

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT", 8080)?,
            database_url,
            jwt_signing_key,
            pubsub_component: std::env::var(ENV_PUBSUB_COMPONENT)
                .unwrap_or_else(|_| DEFAULT_PUBSUB_COMPONENT.to_string()),
            reminder_variance_budget_ms: env_parsed("REMINDER_VARIANCE_BUDGET_MS", 5000)?,
            session_outbound_buffer: env_parsed("SESSION_OUTBOUND_BUFFER", 64)?,
        })
    }
}

/// Current sidecar port, re-read from the environment on every call.
pub fn sidecar_http_port() -> u16 {
    std::env::var(ENV_SIDECAR_HTTP_PORT)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_SIDECAR_HTTP_PORT)
}

fn env_parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} is not a valid value", name)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test because it mutates process-wide environment state.
    #[test]
    fn sidecar_port_tracks_environment_changes() {
        std::env::remove_var(ENV_SIDECAR_HTTP_PORT);
        assert_eq!(sidecar_http_port(), DEFAULT_SIDECAR_HTTP_PORT);

        std::env::set_var(ENV_SIDECAR_HTTP_PORT, "3501");
        assert_eq!(sidecar_http_port(), 3501);
        std::env::set_var(ENV_SIDECAR_HTTP_PORT, "3600");
        assert_eq!(sidecar_http_port(), 3600);
        std::env::remove_var(ENV_SIDECAR_HTTP_PORT);
    }
}

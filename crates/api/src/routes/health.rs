//! Liveness endpoint with a few operator-facing gauges

use crate::server::AppState;
use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub live_sessions: usize,
    pub misconfigured_publishes: u64,
    pub timestamp: DateTime<Utc>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        live_sessions: state.registry.total_sessions(),
        misconfigured_publishes: state.gateway.misconfigured_publish_count(),
        timestamp: Utc::now(),
    })
}

//! HTTP surface of the tasklane engine
//!
//! One axum server carries four kinds of routes:
//!
//! - `/api/users/{user_id}/tasks...` — the task mutation gateway, bearer-token
//!   authenticated, the only path that writes authoritative task state
//! - `/subscriptions` and `/events/...` — the sidecar contract: subscription
//!   advertisement and per-topic event delivery
//! - `/jobs/trigger` — callback from the job facility when a reminder elapses
//! - `/ws` — realtime fanout of `task-updates` deltas to the caller's sessions

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, ErrorResponse};
pub use server::{AppState, EngineServer};

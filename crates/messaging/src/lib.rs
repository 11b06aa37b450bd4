//! Broker-neutral messaging surface over the local sidecar
//!
//! The rest of the engine talks to pub/sub and the job facility exclusively
//! through this crate: [`EventPublisher`] and [`JobScheduler`] for outbound
//! calls, [`EventHandler`] plus the subscription table for inbound delivery.
//! Swapping the concrete broker is a sidecar configuration change; no other
//! crate names an endpoint or a messaging library.

pub mod error;
pub mod jobs;
pub mod publisher;
pub mod subscription;

pub use error::{PublishError, PublishResult};
pub use jobs::{JobScheduler, SidecarJobsClient};
pub use publisher::{EventPublisher, SidecarPublisher};
pub use subscription::{routes, subscription_table, EventHandler, Outcome, OutcomeBody, Subscription};

//! Common types and utilities shared across all tasklane crates

pub mod config;
pub mod error;
pub mod events;
pub mod telemetry;
pub mod types;

pub use config::*;
pub use error::*;
pub use events::*;
pub use types::*;

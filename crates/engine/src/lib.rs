//! Core engine components: the task mutation gateway, recurrence worker,
//! reminder scheduler, audit recorder, and realtime fanout registry.
//!
//! Every component takes its collaborators (repositories, publisher, job
//! facility) as injected trait objects; nothing here names a broker, an HTTP
//! client, or a database driver.

pub mod audit;
pub mod fanout;
pub mod gateway;
pub mod recurrence;
pub mod scheduler;

pub use audit::AuditRecorder;
pub use fanout::{FanoutHandler, FanoutReport, SessionRegistry};
pub use gateway::{CreateTaskRequest, TaskGateway, UpdateTaskRequest};
pub use recurrence::RecurrenceWorker;
pub use scheduler::ReminderScheduler;

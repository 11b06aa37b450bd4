//! Postgres persistence for tasklane: task rows, the append-only audit log,
//! and the reminder job mirror.

pub mod audit;
pub mod postgres;
pub mod reminders;
pub mod repository;
pub mod tasks;

pub use audit::PgAuditLog;
pub use postgres::PostgresStore;
pub use reminders::PgReminderMirror;
pub use repository::{AuditLog, ReminderMirror, SuccessorOutcome, TaskRepository};
pub use tasks::PgTaskRepository;

//! Materializes the next occurrence of a recurring task upon completion

pub mod schedule;
pub mod worker;

pub use schedule::{next_due_date, next_remind_at};
pub use worker::RecurrenceWorker;

//! Calendar arithmetic for recurrence and reminder offsets.
//!
//! Monthly and yearly steps use calendar-aware month addition, which clamps
//! the day-of-month to the last valid day of the target month (Jan 31 ->
//! Feb 28/29, Feb 29 -> Feb 28 in non-leap years). Daily and weekly steps
//! are whole calendar days. Fixed-length `Duration` addition is deliberately
//! not used for the month/year cases.

use chrono::{DateTime, Days, Months, Utc};
use tasklane_common::{RecurrencePattern, Task};

/// Next due instant, exactly one calendar unit after the anchor.
/// `None` only on arithmetic overflow at the edge of chrono's range.
pub fn next_due_date(
    anchor: DateTime<Utc>,
    pattern: RecurrencePattern,
) -> Option<DateTime<Utc>> {
    match pattern {
        RecurrencePattern::Daily => anchor.checked_add_days(Days::new(1)),
        RecurrencePattern::Weekly => anchor.checked_add_days(Days::new(7)),
        RecurrencePattern::Monthly => anchor.checked_add_months(Months::new(1)),
        RecurrencePattern::Yearly => anchor.checked_add_months(Months::new(12)),
    }
}

/// Reminder instant for the successor occurrence.
///
/// When the parent has both `due_date` and `remind_at`, the signed offset
/// `due_date - remind_at` is preserved: `new_due - offset`. Recomputing from
/// the old `remind_at` plus the inter-occurrence delta is NOT equivalent and
/// is exactly the bug this form avoids. A parent with `remind_at` but no
/// `due_date` has no offset to preserve; its reminder advances by the same
/// calendar step as the occurrence itself.
pub fn next_remind_at(
    parent: &Task,
    new_due: DateTime<Utc>,
    pattern: RecurrencePattern,
) -> Option<DateTime<Utc>> {
    let remind_at = parent.remind_at?;
    match parent.reminder_offset() {
        Some(offset) => new_due.checked_sub_signed(offset),
        None => match pattern {
            RecurrencePattern::Daily => remind_at.checked_add_days(Days::new(1)),
            RecurrencePattern::Weekly => remind_at.checked_add_days(Days::new(7)),
            RecurrencePattern::Monthly => remind_at.checked_add_months(Months::new(1)),
            RecurrencePattern::Yearly => remind_at.checked_add_months(Months::new(12)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tasklane_common::{Priority, TaskId, UserId};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn task_with(due: Option<DateTime<Utc>>, remind: Option<DateTime<Utc>>) -> Task {
        Task {
            id: TaskId::new(),
            user_id: UserId::new(),
            title: "recurring".to_string(),
            description: None,
            priority: Priority::Medium,
            tags: vec![],
            is_completed: true,
            due_date: due,
            remind_at: remind,
            is_recurring: true,
            recurrence_pattern: Some(RecurrencePattern::Daily),
            parent_task_id: None,
            next_occurrence_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn daily_advances_one_day() {
        let anchor = utc(2024, 2, 8, 9);
        assert_eq!(
            next_due_date(anchor, RecurrencePattern::Daily),
            Some(utc(2024, 2, 9, 9))
        );
    }

    #[test]
    fn weekly_advances_seven_days() {
        let anchor = utc(2024, 2, 26, 9);
        assert_eq!(
            next_due_date(anchor, RecurrencePattern::Weekly),
            Some(utc(2024, 3, 4, 9))
        );
    }

    #[test]
    fn monthly_clamps_jan_31_to_leap_feb_29() {
        let anchor = utc(2024, 1, 31, 12);
        assert_eq!(
            next_due_date(anchor, RecurrencePattern::Monthly),
            Some(utc(2024, 2, 29, 12))
        );
    }

    #[test]
    fn monthly_clamps_jan_31_to_feb_28_in_non_leap_years() {
        let anchor = utc(2023, 1, 31, 12);
        assert_eq!(
            next_due_date(anchor, RecurrencePattern::Monthly),
            Some(utc(2023, 2, 28, 12))
        );
    }

    #[test]
    fn monthly_from_clamped_feb_keeps_day_29() {
        // Scenario: Jan 31 -> Feb 29 -> Mar 29. The clamp does not restore
        // the original day-of-month.
        let anchor = utc(2024, 2, 29, 12);
        assert_eq!(
            next_due_date(anchor, RecurrencePattern::Monthly),
            Some(utc(2024, 3, 29, 12))
        );
    }

    #[test]
    fn yearly_clamps_feb_29_to_feb_28() {
        let anchor = utc(2024, 2, 29, 8);
        assert_eq!(
            next_due_date(anchor, RecurrencePattern::Yearly),
            Some(utc(2025, 2, 28, 8))
        );
    }

    #[test]
    fn remind_offset_before_due_is_preserved() {
        let due = utc(2024, 2, 8, 9);
        let remind = utc(2024, 2, 8, 8);
        let parent = task_with(Some(due), Some(remind));
        let new_due = next_due_date(due, RecurrencePattern::Daily).unwrap();
        assert_eq!(
            next_remind_at(&parent, new_due, RecurrencePattern::Daily),
            Some(utc(2024, 2, 9, 8))
        );
    }

    #[test]
    fn remind_after_due_keeps_negative_offset() {
        let due = utc(2024, 5, 10, 14);
        let remind = utc(2024, 5, 10, 15);
        let parent = task_with(Some(due), Some(remind));
        let new_due = next_due_date(due, RecurrencePattern::Daily).unwrap();
        assert_eq!(
            next_remind_at(&parent, new_due, RecurrencePattern::Daily),
            Some(utc(2024, 5, 11, 15))
        );
    }

    #[test]
    fn remind_equal_to_due_stays_equal() {
        let due = utc(2024, 5, 10, 14);
        let parent = task_with(Some(due), Some(due));
        let new_due = next_due_date(due, RecurrencePattern::Weekly).unwrap();
        assert_eq!(
            next_remind_at(&parent, new_due, RecurrencePattern::Weekly),
            Some(new_due)
        );
    }

    #[test]
    fn remind_without_due_advances_by_the_pattern() {
        let remind = utc(2024, 1, 31, 7);
        let parent = task_with(None, Some(remind));
        let new_due = utc(2024, 2, 29, 7);
        assert_eq!(
            next_remind_at(&parent, new_due, RecurrencePattern::Monthly),
            Some(utc(2024, 2, 29, 7))
        );
    }

    #[test]
    fn no_remind_means_no_successor_remind() {
        let due = utc(2024, 2, 8, 9);
        let parent = task_with(Some(due), None);
        assert_eq!(
            next_remind_at(&parent, utc(2024, 2, 9, 9), RecurrencePattern::Daily),
            None
        );
    }
}

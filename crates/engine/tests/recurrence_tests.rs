//! Recurrence worker behavior: successor creation, clamping, idempotency

mod common;

use chrono::{TimeZone, Utc};
use common::{recurring_task, InMemoryTaskRepository, RecordingPublisher};
use std::sync::Arc;
use tasklane_common::{topics, EventEnvelope, EventType, RecurrencePattern, UserId};
use tasklane_engine::RecurrenceWorker;
use tasklane_messaging::{EventHandler, Outcome};

fn utc(y: i32, m: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn worker(
    repo: &Arc<InMemoryTaskRepository>,
    publisher: &Arc<RecordingPublisher>,
) -> RecurrenceWorker {
    RecurrenceWorker::new(repo.clone(), publisher.clone())
}

#[tokio::test]
async fn daily_completion_creates_successor_with_preserved_offset() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let parent = recurring_task(
        UserId::new(),
        Some(utc(2024, 2, 8, 9)),
        Some(utc(2024, 2, 8, 8)),
        RecurrencePattern::Daily,
    );
    repo.seed(parent.clone());
    repo.set_completed(parent.id, true);

    let completed = repo.get(parent.id).unwrap();
    let outcome = worker(&repo, &publisher)
        .handle(EventEnvelope::task_event(
            EventType::TaskCompleted,
            &completed,
            None,
        ))
        .await;
    assert_eq!(outcome, Outcome::Success);

    assert_eq!(repo.len(), 2);
    let parent_after = repo.get(parent.id).unwrap();
    let successor_id = parent_after.next_occurrence_id.expect("parent linked");
    let successor = repo.get(successor_id).unwrap();

    assert_eq!(successor.due_date, Some(utc(2024, 2, 9, 9)));
    assert_eq!(successor.remind_at, Some(utc(2024, 2, 9, 8)));
    assert_eq!(successor.parent_task_id, Some(parent.id));
    assert!(!successor.is_completed);
    assert!(successor.is_recurring);
    assert_eq!(successor.title, parent.title);
    assert_eq!(successor.tags, parent.tags);

    // Successor is announced on both task topics with one event id, and its
    // reminder is requested.
    let created: Vec<_> = publisher
        .on_topic(topics::TASK_EVENTS)
        .into_iter()
        .filter(|e| e.event_type == EventType::TaskCreated)
        .collect();
    assert_eq!(created.len(), 1);
    let deltas = publisher.on_topic(topics::TASK_UPDATES);
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].event_id, created[0].event_id);
    assert_eq!(publisher.on_topic(topics::REMINDERS).len(), 1);
}

#[tokio::test]
async fn monthly_recurrence_clamps_through_february() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let parent = recurring_task(
        UserId::new(),
        Some(utc(2024, 1, 31, 12)),
        None,
        RecurrencePattern::Monthly,
    );
    repo.seed(parent.clone());
    repo.set_completed(parent.id, true);

    let w = worker(&repo, &publisher);
    let completed = repo.get(parent.id).unwrap();
    w.handle(EventEnvelope::task_event(EventType::TaskCompleted, &completed, None))
        .await;

    let first = repo
        .get(repo.get(parent.id).unwrap().next_occurrence_id.unwrap())
        .unwrap();
    assert_eq!(first.due_date, Some(utc(2024, 2, 29, 12)));

    // Completing the clamped occurrence steps to Mar 29, not back to the 31st.
    repo.set_completed(first.id, true);
    let completed = repo.get(first.id).unwrap();
    w.handle(EventEnvelope::task_event(EventType::TaskCompleted, &completed, None))
        .await;

    let second = repo
        .get(repo.get(first.id).unwrap().next_occurrence_id.unwrap())
        .unwrap();
    assert_eq!(second.due_date, Some(utc(2024, 3, 29, 12)));
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn reminder_after_due_keeps_its_sign() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let parent = recurring_task(
        UserId::new(),
        Some(utc(2024, 5, 10, 14)),
        Some(utc(2024, 5, 10, 15)),
        RecurrencePattern::Daily,
    );
    repo.seed(parent.clone());
    repo.set_completed(parent.id, true);

    let completed = repo.get(parent.id).unwrap();
    worker(&repo, &publisher)
        .handle(EventEnvelope::task_event(
            EventType::TaskCompleted,
            &completed,
            None,
        ))
        .await;

    let successor = repo
        .get(repo.get(parent.id).unwrap().next_occurrence_id.unwrap())
        .unwrap();
    assert_eq!(successor.due_date, Some(utc(2024, 5, 11, 14)));
    assert_eq!(successor.remind_at, Some(utc(2024, 5, 11, 15)));

    // The signed offset is identical on both generations.
    let parent_after = repo.get(parent.id).unwrap();
    assert_eq!(parent_after.reminder_offset(), successor.reminder_offset());
}

#[tokio::test]
async fn redelivering_completion_five_times_creates_one_successor() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let parent = recurring_task(
        UserId::new(),
        Some(utc(2024, 2, 8, 9)),
        None,
        RecurrencePattern::Daily,
    );
    repo.seed(parent.clone());
    repo.set_completed(parent.id, true);

    let completed = repo.get(parent.id).unwrap();
    let envelope = EventEnvelope::task_event(EventType::TaskCompleted, &completed, None);

    let w = worker(&repo, &publisher);
    for _ in 0..5 {
        let outcome = w.handle(envelope.clone()).await;
        assert_eq!(outcome, Outcome::Success);
    }

    assert_eq!(repo.len(), 2, "exactly one successor despite five deliveries");
    let created_count = publisher
        .on_topic(topics::TASK_EVENTS)
        .iter()
        .filter(|e| e.event_type == EventType::TaskCreated)
        .count();
    assert_eq!(created_count, 1);
}

#[tokio::test]
async fn non_recurring_completion_is_acked_as_noop() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let mut task = recurring_task(UserId::new(), None, None, RecurrencePattern::Daily);
    task.is_recurring = false;
    task.recurrence_pattern = None;
    repo.seed(task.clone());
    repo.set_completed(task.id, true);

    let completed = repo.get(task.id).unwrap();
    let outcome = worker(&repo, &publisher)
        .handle(EventEnvelope::task_event(
            EventType::TaskCompleted,
            &completed,
            None,
        ))
        .await;

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(repo.len(), 1);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn successor_is_computed_from_the_row_not_the_stale_payload() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let parent = recurring_task(
        UserId::new(),
        Some(utc(2024, 6, 1, 10)),
        None,
        RecurrencePattern::Daily,
    );
    repo.seed(parent.clone());
    repo.set_completed(parent.id, true);

    // Envelope carries a stale due date from a previous occurrence.
    let mut stale = parent.clone();
    stale.due_date = Some(utc(2023, 1, 1, 0));
    let envelope = EventEnvelope::task_event(EventType::TaskCompleted, &stale, None);

    worker(&repo, &publisher).handle(envelope).await;

    let successor = repo
        .get(repo.get(parent.id).unwrap().next_occurrence_id.unwrap())
        .unwrap();
    assert_eq!(successor.due_date, Some(utc(2024, 6, 2, 10)));
}

#[tokio::test]
async fn completion_of_missing_task_is_acked() {
    let repo = Arc::new(InMemoryTaskRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let ghost = recurring_task(
        UserId::new(),
        Some(utc(2024, 2, 8, 9)),
        None,
        RecurrencePattern::Daily,
    );
    let outcome = worker(&repo, &publisher)
        .handle(EventEnvelope::task_event(
            EventType::TaskCompleted,
            &ghost,
            None,
        ))
        .await;

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(repo.len(), 0);
}

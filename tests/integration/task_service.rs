//! Integration tests for the task service: field rules, the completion
//! lifecycle, ownership, bulk deletion and upcoming listings.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_precision_loss)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use taskdeck::clock::ManualClock;
use taskdeck::dashboard::Dashboard;
use taskdeck::ratelimit::{RateLimitConfig, RateLimiter};
use taskdeck::service::{Anonymous, ServiceError, TaskService};
use taskdeck::store::{MemoryRepository, StoreError, TaskRepository, TaskStore};
use taskdeck::validate::{ValidationError, ValidationLimits};
use taskdeck_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use taskdeck_proto::task::{Task, TaskId, TaskPriority, TaskStatus, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const START: u64 = 1_700_000_000_000;

/// A service over `repo` with no rate limits, so tests can create as many
/// tasks as they need.
fn make_service_over<R: TaskRepository>(repo: Arc<R>) -> (TaskService<R>, ManualClock) {
    let clock = ManualClock::new(Timestamp::from_millis(START));
    let shared = Arc::new(clock.clone());
    let store = TaskStore::new(repo, shared.clone());
    let limiter = Arc::new(RateLimiter::new(&RateLimitConfig::unlimited(), shared.clone()));
    let service = TaskService::new(store, limiter, ValidationLimits::default(), shared);
    (service, clock)
}

fn make_service() -> (TaskService<MemoryRepository>, ManualClock) {
    make_service_over(Arc::new(MemoryRepository::new()))
}

fn alice() -> UserId {
    UserId::new("alice")
}

fn bob() -> UserId {
    UserId::new("bob")
}

fn create<R: TaskRepository>(service: &TaskService<R>, owner: &UserId, title: &str) -> Task {
    service
        .create_task(owner, CreateTaskRequest::titled(title))
        .expect("create should succeed")
        .task
}

fn create_completed<R: TaskRepository>(
    service: &TaskService<R>,
    owner: &UserId,
    title: &str,
) -> Task {
    let request = CreateTaskRequest {
        status: Some(TaskStatus::Completed),
        ..CreateTaskRequest::titled(title)
    };
    service
        .create_task(owner, request)
        .expect("create should succeed")
        .task
}

fn set_status<R: TaskRepository>(
    service: &TaskService<R>,
    owner: &UserId,
    id: &TaskId,
    status: TaskStatus,
) -> Result<Task, ServiceError> {
    let request = UpdateTaskRequest {
        status: Some(status),
        ..UpdateTaskRequest::default()
    };
    service.update_task(owner, id, request).map(|w| w.task)
}

/// Wraps the in-memory repository so a test can change rows between the
/// removals of a bulk delete, or make the N-th removal fail.
#[derive(Default)]
struct ScriptedRepository {
    inner: MemoryRepository,
    removals: AtomicUsize,
    fail_on_removal: Option<usize>,
    reopen_after_removal: Mutex<Option<TaskId>>,
    delete_after_removal: Mutex<Option<TaskId>>,
}

impl ScriptedRepository {
    fn failing_on_removal(n: usize) -> Self {
        Self {
            fail_on_removal: Some(n),
            ..Self::default()
        }
    }
}

impl TaskRepository for ScriptedRepository {
    fn insert(&self, task: Task) -> Result<(), StoreError> {
        self.inner.insert(task)
    }

    fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.get(id)
    }

    fn scan_by_owner(&self, owner: &UserId) -> Vec<Task> {
        self.inner.scan_by_owner(owner)
    }

    fn scan_by_owner_and_status(&self, owner: &UserId, status: TaskStatus) -> Vec<Task> {
        self.inner.scan_by_owner_and_status(owner, status)
    }

    fn scan_by_owner_due(&self, owner: &UserId, before: Option<Timestamp>) -> Vec<Task> {
        self.inner.scan_by_owner_due(owner, before)
    }

    fn update<F>(&self, id: &TaskId, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        self.inner.update(id, apply)
    }

    fn remove(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.inner.remove(id)
    }

    fn remove_if<P>(&self, id: &TaskId, matches: P) -> Result<Option<Task>, StoreError>
    where
        P: FnOnce(&Task) -> bool,
    {
        let n = self.removals.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_removal == Some(n) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        let removed = self.inner.remove_if(id, matches)?;
        if let Some(other) = self.reopen_after_removal.lock().take() {
            self.inner.update(&other, |t| {
                t.status = TaskStatus::Todo;
                t.completed_at = None;
            })?;
        }
        if let Some(other) = self.delete_after_removal.lock().take() {
            self.inner.remove(&other)?;
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Title rules
// ---------------------------------------------------------------------------

#[test]
fn whitespace_only_title_is_invalid() {
    let (service, _clock) = make_service();
    for title in ["", " ", "\t\n  "] {
        let err = service
            .create_task(&alice(), CreateTaskRequest::titled(title))
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput(ValidationError::TitleEmpty));
    }
}

#[test]
fn title_of_exactly_200_chars_is_accepted() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), &"a".repeat(200));
    assert_eq!(task.title.chars().count(), 200);
}

#[test]
fn title_of_201_chars_is_rejected() {
    let (service, _clock) = make_service();
    let err = service
        .create_task(&alice(), CreateTaskRequest::titled("a".repeat(201)))
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::InvalidInput(ValidationError::TitleTooLong { max: 200 })
    );
    assert_eq!(
        err.to_string(),
        "task title cannot exceed 200 characters"
    );
}

#[test]
fn title_length_counts_characters_not_bytes() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), &"é".repeat(200));
    assert_eq!(task.title.chars().count(), 200);
}

#[test]
fn update_with_blank_title_is_rejected_and_leaves_task() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), "keep me");
    let request = UpdateTaskRequest {
        title: Some("   ".to_string()),
        ..UpdateTaskRequest::default()
    };
    assert!(matches!(
        service.update_task(&alice(), &task.id, request).unwrap_err(),
        ServiceError::InvalidInput(ValidationError::TitleEmpty)
    ));
    assert_eq!(service.get_task(&alice(), &task.id).unwrap().title, "keep me");
}

// ---------------------------------------------------------------------------
// Completion lifecycle
// ---------------------------------------------------------------------------

#[test]
fn completing_sets_completed_at_to_update_time() {
    let (service, clock) = make_service();
    let task = create(&service, &alice(), "write report");
    clock.advance(60_000);

    let done = set_status(&service, &alice(), &task.id, TaskStatus::Completed).unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.completed_at, Some(Timestamp::from_millis(START + 60_000)));
    assert_eq!(done.updated_at, Timestamp::from_millis(START + 60_000));
}

#[test]
fn reopening_clears_completed_at() {
    let (service, clock) = make_service();
    let task = create(&service, &alice(), "write report");
    set_status(&service, &alice(), &task.id, TaskStatus::Completed).unwrap();
    clock.advance(1_000);

    for status in [TaskStatus::Todo, TaskStatus::InProgress] {
        set_status(&service, &alice(), &task.id, TaskStatus::Completed).unwrap();
        let reopened = set_status(&service, &alice(), &task.id, status).unwrap();
        assert_eq!(reopened.status, status);
        assert_eq!(reopened.completed_at, None);
    }
}

#[test]
fn moving_between_open_statuses_leaves_completed_at_unset() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), "write report");
    let started = set_status(&service, &alice(), &task.id, TaskStatus::InProgress).unwrap();
    assert_eq!(started.completed_at, None);
    let back = set_status(&service, &alice(), &task.id, TaskStatus::Todo).unwrap();
    assert_eq!(back.completed_at, None);
}

#[test]
fn non_status_patch_preserves_completion() {
    let (service, clock) = make_service();
    let task = create(&service, &alice(), "write report");
    let done = set_status(&service, &alice(), &task.id, TaskStatus::Completed).unwrap();
    clock.advance(5_000);

    let request = UpdateTaskRequest {
        priority: Some(TaskPriority::High),
        ..UpdateTaskRequest::default()
    };
    let edited = service.update_task(&alice(), &task.id, request).unwrap().task;
    assert_eq!(edited.completed_at, done.completed_at);
    assert_eq!(edited.priority, Some(TaskPriority::High));
    assert_eq!(edited.updated_at, Timestamp::from_millis(START + 5_000));
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[test]
fn foreign_update_is_forbidden_and_task_unchanged() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), "private");
    let request = UpdateTaskRequest {
        title: Some("hijacked".to_string()),
        status: Some(TaskStatus::Completed),
        ..UpdateTaskRequest::default()
    };
    assert_eq!(
        service.update_task(&bob(), &task.id, request).unwrap_err(),
        ServiceError::Forbidden(task.id)
    );
    assert_eq!(service.get_task(&alice(), &task.id).unwrap(), task);
}

#[test]
fn foreign_delete_is_forbidden_and_task_kept() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), "private");
    assert_eq!(
        service.delete_task(&bob(), &task.id).unwrap_err(),
        ServiceError::Forbidden(task.id)
    );
    assert_eq!(service.get_task(&alice(), &task.id).unwrap(), task);
}

#[test]
fn foreign_read_looks_like_missing_task() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), "private");
    assert_eq!(
        service.get_task(&bob(), &task.id).unwrap_err(),
        ServiceError::NotFound(task.id)
    );
    assert!(service.list_tasks(&bob()).unwrap().is_empty());
}

#[test]
fn unauthenticated_calls_fail_before_anything_else() {
    let (service, _clock) = make_service();
    let task = create(&service, &alice(), "private");
    assert_eq!(
        service.delete_task(&Anonymous, &task.id).unwrap_err(),
        ServiceError::Unauthenticated
    );
    assert_eq!(
        service.delete_completed_tasks(&None::<UserId>).unwrap_err(),
        ServiceError::Unauthenticated
    );
    assert_eq!(
        service.list_upcoming_tasks(&Anonymous, None).unwrap_err(),
        ServiceError::Unauthenticated
    );
}

// ---------------------------------------------------------------------------
// Bulk deletion
// ---------------------------------------------------------------------------

#[test]
fn delete_completed_removes_exactly_the_completed_tasks() {
    let (service, _clock) = make_service();
    let mut open = Vec::new();
    for i in 0..5 {
        let task = create(&service, &alice(), &format!("task {i}"));
        if i < 3 {
            set_status(&service, &alice(), &task.id, TaskStatus::Completed).unwrap();
        } else {
            open.push(task.id);
        }
    }
    let bobs = create(&service, &bob(), "bob's done");
    set_status(&service, &bob(), &bobs.id, TaskStatus::Completed).unwrap();

    let result = service.delete_completed_tasks(&alice()).unwrap();
    assert_eq!(result.deleted_count, 3);

    let mut remaining: Vec<TaskId> = service
        .list_tasks(&alice())
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    remaining.sort();
    open.sort();
    assert_eq!(remaining, open);
    assert!(service.get_task(&bob(), &bobs.id).is_ok());
}

#[test]
fn delete_completed_with_nothing_completed_is_zero() {
    let (service, _clock) = make_service();
    create(&service, &alice(), "open");
    let result = service.delete_completed_tasks(&alice()).unwrap();
    assert_eq!(result.deleted_count, 0);
    assert_eq!(service.get_task_stats(&alice()).unwrap().total, 1);
}

#[test]
fn delete_completed_spares_task_reopened_during_the_pass() {
    let repo = Arc::new(ScriptedRepository::default());
    let (service, clock) = make_service_over(Arc::clone(&repo));
    let older = create_completed(&service, &alice(), "older");
    clock.advance(10);
    let newer = create_completed(&service, &alice(), "newer");
    // newest goes first; the owner reopens the older one right after
    *repo.reopen_after_removal.lock() = Some(older.id);

    let result = service.delete_completed_tasks(&alice()).unwrap();
    assert_eq!(result.deleted_count, 1);
    assert!(service.get_task(&alice(), &newer.id).is_err());

    let kept = service.get_task(&alice(), &older.id).unwrap();
    assert_eq!(kept.status, TaskStatus::Todo);
    assert_eq!(kept.completed_at, None);
}

#[test]
fn delete_completed_skips_task_deleted_during_the_pass() {
    let repo = Arc::new(ScriptedRepository::default());
    let (service, clock) = make_service_over(Arc::clone(&repo));
    let older = create_completed(&service, &alice(), "older");
    clock.advance(10);
    create_completed(&service, &alice(), "newer");
    *repo.delete_after_removal.lock() = Some(older.id);

    let result = service.delete_completed_tasks(&alice()).unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(service.get_task_stats(&alice()).unwrap().total, 0);
}

#[test]
fn delete_completed_failure_abandons_the_rest_and_keeps_earlier_deletions() {
    let repo = Arc::new(ScriptedRepository::failing_on_removal(3));
    let (service, clock) = make_service_over(Arc::clone(&repo));
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(create_completed(&service, &alice(), &format!("done {i}")).id);
        clock.advance(10);
    }
    let open = create(&service, &alice(), "open");

    let err = service.delete_completed_tasks(&alice()).unwrap_err();
    assert_eq!(
        err,
        ServiceError::Storage(StoreError::Unavailable("disk full".to_string()))
    );

    // newest first: the two newest went before the failing removal
    assert!(service.get_task(&alice(), &ids[3]).is_err());
    assert!(service.get_task(&alice(), &ids[2]).is_err());
    assert!(service.get_task(&alice(), &ids[1]).is_ok());
    assert!(service.get_task(&alice(), &ids[0]).is_ok());
    assert!(service.get_task(&alice(), &open.id).is_ok());

    let retry = service.delete_completed_tasks(&alice()).unwrap();
    assert_eq!(retry.deleted_count, 2);
    assert_eq!(service.get_task_stats(&alice()).unwrap().total, 1);
}

// ---------------------------------------------------------------------------
// Upcoming
// ---------------------------------------------------------------------------

#[test]
fn upcoming_excludes_undated_and_sorts_ascending() {
    let (service, _clock) = make_service();
    for (title, due) in [
        ("in a week", Some(START + 604_800_000)),
        ("someday", None),
        ("tomorrow", Some(START + 86_400_000)),
        ("in an hour", Some(START + 3_600_000)),
    ] {
        let request = CreateTaskRequest {
            due_date: due.map(|d| d as f64),
            ..CreateTaskRequest::titled(title)
        };
        service.create_task(&alice(), request).unwrap();
    }

    let titles: Vec<String> = service
        .list_upcoming_tasks(&alice(), None)
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["in an hour", "tomorrow", "in a week"]);

    let bounded: Vec<String> = service
        .list_upcoming_tasks(&alice(), Some(Timestamp::from_millis(START + 86_400_000)))
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(bounded, vec!["in an hour", "tomorrow"]);
}

#[test]
fn fractional_due_date_is_truncated() {
    let (service, _clock) = make_service();
    let request = CreateTaskRequest {
        due_date: Some((START + 10) as f64 + 0.75),
        ..CreateTaskRequest::titled("fractional")
    };
    let write = service.create_task(&alice(), request).unwrap();
    assert_eq!(write.task.due_date, Some(Timestamp::from_millis(START + 10)));
    assert!(write.warnings.is_empty());
}

#[test]
fn negative_due_date_is_invalid() {
    let (service, _clock) = make_service();
    let request = CreateTaskRequest {
        due_date: Some(-1.0),
        ..CreateTaskRequest::titled("negative")
    };
    assert_eq!(
        service.create_task(&alice(), request).unwrap_err(),
        ServiceError::InvalidInput(ValidationError::InvalidDueDate)
    );
}

// ---------------------------------------------------------------------------
// Stats and dashboard
// ---------------------------------------------------------------------------

#[test]
fn stats_and_dashboard_agree() {
    let (service, clock) = make_service();
    let a = create(&service, &alice(), "a");
    let b = create(&service, &alice(), "b");
    create(&service, &alice(), "c");
    clock.advance(1);
    set_status(&service, &alice(), &a.id, TaskStatus::Completed).unwrap();
    clock.advance(1);
    set_status(&service, &alice(), &b.id, TaskStatus::InProgress).unwrap();

    let dashboard = Dashboard::new(service.store().clone());
    let stats = service.get_task_stats(&alice()).unwrap();
    assert_eq!(dashboard.summary(&alice()).unwrap(), stats);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.todo + stats.in_progress + stats.completed, stats.total);

    let recent = dashboard.recent(&alice(), None).unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].id, b.id);
    assert_eq!(recent[1].id, a.id);
}

//! Integration tests for per-caller rate limiting, both directly on the
//! limiter and through the task service.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskdeck::clock::ManualClock;
use taskdeck::ratelimit::{
    FixedWindowPolicy, Operation, RateLimitConfig, RateLimitPolicy, RateLimiter, TokenBucketPolicy,
};
use taskdeck::service::{ServiceError, TaskService};
use taskdeck::store::MemoryRepository;
use taskdeck_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use taskdeck_proto::task::{TaskStatus, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn make_limiter(config: &RateLimitConfig) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new(Timestamp::from_millis(5_000_000));
    let limiter = RateLimiter::new(config, Arc::new(clock.clone()));
    (limiter, clock)
}

fn make_service() -> (TaskService<MemoryRepository>, ManualClock) {
    let clock = ManualClock::new(Timestamp::from_millis(5_000_000));
    let service =
        TaskService::with_defaults(Arc::new(MemoryRepository::new()), Arc::new(clock.clone()));
    (service, clock)
}

fn caller(name: &str) -> UserId {
    UserId::new(name)
}

// ---------------------------------------------------------------------------
// Token bucket
// ---------------------------------------------------------------------------

#[test]
fn token_bucket_allows_burst_then_denies_then_recovers() {
    let config = RateLimitConfig::unlimited().with_policy(
        Operation::CreateTask,
        RateLimitPolicy::TokenBucket(TokenBucketPolicy {
            rate: 20,
            period_ms: 60_000,
            capacity: 5,
        }),
    );
    let (limiter, clock) = make_limiter(&config);
    let alice = caller("alice");

    for _ in 0..5 {
        assert!(limiter.admit(Operation::CreateTask, &alice).allowed);
    }
    let denied = limiter.admit(Operation::CreateTask, &alice);
    assert!(!denied.allowed);
    assert!(denied.retry_after_ms > 0);

    clock.advance(denied.retry_after_ms);
    assert!(limiter.admit(Operation::CreateTask, &alice).allowed);
}

#[test]
fn service_create_is_limited_per_caller() {
    let (service, clock) = make_service();
    let alice = caller("alice");

    for i in 0..5 {
        service
            .create_task(&alice, CreateTaskRequest::titled(format!("task {i}")))
            .unwrap();
    }
    let err = service
        .create_task(&alice, CreateTaskRequest::titled("one too many"))
        .unwrap_err();
    let ServiceError::RateLimited(limited) = &err else {
        panic!("expected rate limit, got {err:?}");
    };
    assert_eq!(limited.operation, Operation::CreateTask);
    assert_eq!(limited.retry_after_ms, 3_000);
    assert_eq!(err.to_string(), "rate limit exceeded for createTask, retry in 3000ms");

    // another caller has an untouched bucket
    service
        .create_task(&caller("bob"), CreateTaskRequest::titled("bob's"))
        .unwrap();

    clock.advance(3_000);
    service
        .create_task(&alice, CreateTaskRequest::titled("after waiting"))
        .unwrap();
}

#[test]
fn exhausting_create_does_not_affect_update() {
    let (service, _clock) = make_service();
    let alice = caller("alice");
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            service
                .create_task(&alice, CreateTaskRequest::titled(format!("task {i}")))
                .unwrap()
                .task
                .id,
        );
    }
    assert!(service
        .create_task(&alice, CreateTaskRequest::titled("denied"))
        .is_err());

    let request = UpdateTaskRequest {
        status: Some(TaskStatus::InProgress),
        ..UpdateTaskRequest::default()
    };
    service.update_task(&alice, &ids[0], request).unwrap();
}

#[test]
fn denied_create_stores_nothing() {
    let (service, _clock) = make_service();
    let alice = caller("alice");
    for i in 0..6 {
        let _ = service.create_task(&alice, CreateTaskRequest::titled(format!("task {i}")));
    }
    assert_eq!(service.list_tasks(&alice).unwrap().len(), 5);
}

// ---------------------------------------------------------------------------
// Fixed window
// ---------------------------------------------------------------------------

#[test]
fn fixed_window_allows_limit_then_resets() {
    let config = RateLimitConfig::unlimited().with_policy(
        Operation::BulkDelete,
        RateLimitPolicy::FixedWindow(FixedWindowPolicy {
            limit: 5,
            window_ms: 3_600_000,
        }),
    );
    let (limiter, clock) = make_limiter(&config);
    let alice = caller("alice");

    for _ in 0..5 {
        assert!(limiter.admit(Operation::BulkDelete, &alice).allowed);
        clock.advance(60_000);
    }
    let denied = limiter.admit(Operation::BulkDelete, &alice);
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_ms, 3_600_000 - 5 * 60_000);

    clock.advance(denied.retry_after_ms);
    for _ in 0..5 {
        assert!(limiter.admit(Operation::BulkDelete, &alice).allowed);
    }
    assert!(!limiter.admit(Operation::BulkDelete, &alice).allowed);
}

#[test]
fn service_bulk_delete_is_limited_to_five_an_hour() {
    let (service, clock) = make_service();
    let alice = caller("alice");
    for _ in 0..5 {
        assert_eq!(service.delete_completed_tasks(&alice).unwrap().deleted_count, 0);
    }
    let err = service.delete_completed_tasks(&alice).unwrap_err();
    assert_eq!(err.retry_after_ms(), Some(3_600_000));

    clock.advance(3_600_000);
    assert!(service.delete_completed_tasks(&alice).is_ok());
}

// ---------------------------------------------------------------------------
// State bound and concurrency
// ---------------------------------------------------------------------------

#[test]
fn tracked_callers_stay_within_bound() {
    let config = RateLimitConfig::default().with_max_tracked_callers(8);
    let (limiter, _clock) = make_limiter(&config);
    for i in 0..100 {
        let _ = limiter.admit(Operation::UpdateTask, &caller(&format!("user-{i}")));
    }
    assert!(limiter.tracked_callers(Operation::UpdateTask) <= 8);
    assert_eq!(limiter.tracked_callers(Operation::CreateTask), 0);
}

#[test]
fn concurrent_callers_never_overspend() {
    let config = RateLimitConfig::default();
    let (limiter, _clock) = make_limiter(&config);
    let limiter = Arc::new(limiter);
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                let alice = caller("alice");
                for _ in 0..10 {
                    if limiter.admit(Operation::DeleteTask, &alice).allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // deleteTask bucket holds 5 tokens and the clock never moves
    assert_eq!(admitted.load(Ordering::SeqCst), 5);
}

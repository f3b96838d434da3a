//! Per-operation, per-caller admission control.
//!
//! Each [`Operation`] gets its own policy (token bucket or fixed window) and
//! its own keyed state, so exhausting one operation's quota never affects
//! another's. Admission-and-consume for a given `(operation, caller)` pair
//! runs under that pair's mutex, so two concurrent calls can never spend the
//! same token.
//!
//! State is created lazily and bounded by
//! [`RateLimitConfig::max_tracked_callers`] per operation: when a new caller
//! would exceed the bound, fully replenished entries are dropped first, then
//! the least recently used one.

pub mod bucket;
pub mod config;
pub mod window;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use taskdeck_proto::task::{Timestamp, UserId};

pub use bucket::{BucketState, TokenBucketPolicy};
pub use config::{InvalidPolicy, RateLimitConfig, RateLimitPolicy};
pub use window::{FixedWindowPolicy, WindowState};

use crate::clock::SharedClock;

/// A rate-limited service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Creating a task.
    CreateTask,
    /// Updating a task.
    UpdateTask,
    /// Deleting a single task.
    DeleteTask,
    /// Deleting all completed tasks at once.
    BulkDelete,
}

impl Operation {
    /// All rate-limited operations.
    pub const ALL: [Self; 4] = [
        Self::CreateTask,
        Self::UpdateTask,
        Self::DeleteTask,
        Self::BulkDelete,
    ];

    /// Returns the operation's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTask => "createTask",
            Self::UpdateTask => "updateTask",
            Self::DeleteTask => "deleteTask",
            Self::BulkDelete => "bulkDelete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the call may proceed.
    pub allowed: bool,
    /// Milliseconds to wait before retrying; zero when allowed.
    pub retry_after_ms: u64,
}

impl Admission {
    /// An admitted call.
    #[must_use]
    pub const fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_ms: 0,
        }
    }

    /// A rejected call that may retry after `retry_after_ms`.
    #[must_use]
    pub const fn denied(retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            retry_after_ms,
        }
    }
}

/// A rejected admission, as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {operation}, retry in {retry_after_ms}ms")]
pub struct RateLimited {
    /// The throttled operation.
    pub operation: Operation,
    /// Milliseconds to wait before retrying.
    pub retry_after_ms: u64,
}

#[derive(Debug, Clone, Copy)]
enum LimitState {
    Bucket(BucketState),
    Window(WindowState),
}

impl LimitState {
    fn fresh(policy: &RateLimitPolicy, now: Timestamp) -> Self {
        match policy {
            RateLimitPolicy::TokenBucket(p) => Self::Bucket(BucketState::full(p, now)),
            RateLimitPolicy::FixedWindow(_) => Self::Window(WindowState::open(now)),
        }
    }

    fn admit(&mut self, policy: &RateLimitPolicy, now: Timestamp) -> Admission {
        match (self, policy) {
            (Self::Bucket(state), RateLimitPolicy::TokenBucket(p)) => state.admit(p, now),
            (Self::Window(state), RateLimitPolicy::FixedWindow(p)) => state.admit(p, now),
            (state, policy) => {
                // Policy kind never changes after construction.
                *state = Self::fresh(policy, now);
                state.admit(policy, now)
            }
        }
    }

    fn is_replenished(&self, policy: &RateLimitPolicy, now: Timestamp) -> bool {
        match (self, policy) {
            (Self::Bucket(state), RateLimitPolicy::TokenBucket(p)) => state.is_replenished(p, now),
            (Self::Window(state), RateLimitPolicy::FixedWindow(p)) => state.is_replenished(p, now),
            _ => true,
        }
    }
}

#[derive(Debug)]
struct Entry {
    state: LimitState,
    last_seen: Timestamp,
}

/// Keyed state for one operation.
struct KeyedLimiter {
    policy: RateLimitPolicy,
    max_callers: usize,
    entries: RwLock<HashMap<UserId, Arc<Mutex<Entry>>>>,
}

impl KeyedLimiter {
    fn new(policy: RateLimitPolicy, max_callers: usize) -> Self {
        Self {
            policy,
            max_callers: max_callers.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, caller: &UserId, now: Timestamp) -> Arc<Mutex<Entry>> {
        if let Some(entry) = self.entries.read().get(caller) {
            return Arc::clone(entry);
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(caller) {
            return Arc::clone(entry);
        }
        if entries.len() >= self.max_callers {
            self.evict(&mut entries, now);
        }
        let entry = Arc::new(Mutex::new(Entry {
            state: LimitState::fresh(&self.policy, now),
            last_seen: now,
        }));
        entries.insert(caller.clone(), Arc::clone(&entry));
        entry
    }

    /// Makes room for one more caller. Entries locked by an in-flight
    /// admission are never touched.
    fn evict(&self, entries: &mut HashMap<UserId, Arc<Mutex<Entry>>>, now: Timestamp) {
        let before = entries.len();
        entries.retain(|_, entry| {
            entry
                .try_lock()
                .is_none_or(|e| !e.state.is_replenished(&self.policy, now))
        });

        if entries.len() >= self.max_callers {
            let oldest = entries
                .iter()
                .filter_map(|(caller, entry)| entry.try_lock().map(|e| (e.last_seen, caller)))
                .min_by_key(|(last_seen, _)| *last_seen)
                .map(|(_, caller)| caller.clone());
            if let Some(caller) = oldest {
                entries.remove(&caller);
            }
        }

        tracing::debug!(
            evicted = before - entries.len(),
            remaining = entries.len(),
            "evicted rate limit state"
        );
    }

    fn admit(&self, caller: &UserId, now: Timestamp) -> Admission {
        loop {
            let entry = self.entry(caller, now);
            let mut locked = entry.lock();
            // Eviction can drop the entry between lookup and lock. Once locked
            // and still mapped it can no longer be evicted.
            if !self.is_current(caller, &entry) {
                continue;
            }
            locked.last_seen = locked.last_seen.max(now);
            return locked.state.admit(&self.policy, now);
        }
    }

    fn is_current(&self, caller: &UserId, entry: &Arc<Mutex<Entry>>) -> bool {
        self.entries
            .read()
            .get(caller)
            .is_some_and(|mapped| Arc::ptr_eq(mapped, entry))
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Admission control for all rate-limited operations.
pub struct RateLimiter {
    limiters: HashMap<Operation, KeyedLimiter>,
    clock: SharedClock,
}

impl RateLimiter {
    /// Builds a limiter from an explicit policy table.
    #[must_use]
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Self {
        let limiters = config
            .policies()
            .map(|(op, policy)| (op, KeyedLimiter::new(*policy, config.max_tracked_callers)))
            .collect();
        Self { limiters, clock }
    }

    /// Checks and, if allowed, consumes quota for `caller` on `operation`.
    ///
    /// Operations without a configured policy are always admitted.
    pub fn admit(&self, operation: Operation, caller: &UserId) -> Admission {
        let Some(limiter) = self.limiters.get(&operation) else {
            return Admission::allowed();
        };
        limiter.admit(caller, self.clock.now())
    }

    /// Like [`admit`](Self::admit), but as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] when the call is denied.
    pub fn check(&self, operation: Operation, caller: &UserId) -> Result<(), RateLimited> {
        let admission = self.admit(operation, caller);
        if admission.allowed {
            Ok(())
        } else {
            Err(RateLimited {
                operation,
                retry_after_ms: admission.retry_after_ms,
            })
        }
    }

    /// Number of callers with state held for `operation`.
    #[must_use]
    pub fn tracked_callers(&self, operation: Operation) -> usize {
        self.limiters.get(&operation).map_or(0, KeyedLimiter::len)
    }
}

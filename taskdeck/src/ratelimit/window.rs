//! Fixed window: at most `limit` events per window, counter reset when a
//! new window begins.

use serde::{Deserialize, Serialize};
use taskdeck_proto::task::Timestamp;

use super::Admission;

/// Parameters of a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWindowPolicy {
    /// Events allowed per window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// Mutable state of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    window_start: Timestamp,
    count: u32,
}

impl WindowState {
    /// An empty window opening at `now`.
    #[must_use]
    pub const fn open(now: Timestamp) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Events counted in the current window.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    fn window_end(&self, policy: &FixedWindowPolicy) -> Timestamp {
        self.window_start.plus_millis(policy.window_ms)
    }

    /// Starts a new window if the current one has elapsed, then counts the
    /// event if the window still has room.
    pub fn admit(&mut self, policy: &FixedWindowPolicy, now: Timestamp) -> Admission {
        if now >= self.window_end(policy) {
            *self = Self::open(now);
        }
        if self.count < policy.limit {
            self.count += 1;
            return Admission::allowed();
        }
        Admission::denied(self.window_end(policy).millis_since(now).max(1))
    }

    /// Returns `true` once the window has elapsed.
    #[must_use]
    pub fn is_replenished(&self, policy: &FixedWindowPolicy, now: Timestamp) -> bool {
        self.count == 0 || now >= self.window_end(policy)
    }
}

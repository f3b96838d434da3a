//! Token bucket: bounded bursts above a steady refill rate.

use serde::{Deserialize, Serialize};
use taskdeck_proto::task::Timestamp;

use super::Admission;

/// Slack when comparing fractional token counts, so a refill that lands on
/// exactly one token is not lost to floating-point rounding.
const TOKEN_EPSILON: f64 = 1e-9;

/// Parameters of a token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucketPolicy {
    /// Tokens added per `period_ms`.
    pub rate: u32,
    /// Refill period in milliseconds.
    pub period_ms: u64,
    /// Maximum number of stored tokens (the burst size).
    pub capacity: u32,
}

impl TokenBucketPolicy {
    const fn refills(&self) -> bool {
        self.rate > 0 && self.period_ms > 0
    }
}

/// Mutable state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    tokens: f64,
    last_refill: Timestamp,
}

impl BucketState {
    /// A bucket filled to capacity at `now`.
    #[must_use]
    pub fn full(policy: &TokenBucketPolicy, now: Timestamp) -> Self {
        Self {
            tokens: f64::from(policy.capacity),
            last_refill: now,
        }
    }

    /// Tokens currently held (after the last refill).
    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    #[allow(clippy::cast_precision_loss)]
    fn refill(&mut self, policy: &TokenBucketPolicy, now: Timestamp) {
        if policy.refills() {
            let elapsed = now.millis_since(self.last_refill) as f64;
            let gained = elapsed * f64::from(policy.rate) / policy.period_ms as f64;
            self.tokens = (self.tokens + gained).min(f64::from(policy.capacity));
        }
        self.last_refill = self.last_refill.max(now);
    }

    /// Refills, then tries to take one token.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn admit(&mut self, policy: &TokenBucketPolicy, now: Timestamp) -> Admission {
        self.refill(policy, now);
        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            return Admission::allowed();
        }

        if !policy.refills() {
            return Admission::denied(u64::MAX);
        }
        let deficit = 1.0 - self.tokens;
        let wait = (deficit * policy.period_ms as f64 / f64::from(policy.rate)).ceil();
        let retry_after_ms = if wait >= u64::MAX as f64 {
            u64::MAX
        } else {
            (wait as u64).max(1)
        };
        Admission::denied(retry_after_ms)
    }

    /// Returns `true` once the bucket would be back at full capacity, i.e.
    /// forgetting it is indistinguishable from keeping it.
    #[must_use]
    pub fn is_replenished(&self, policy: &TokenBucketPolicy, now: Timestamp) -> bool {
        let mut probe = *self;
        probe.refill(policy, now);
        probe.tokens + TOKEN_EPSILON >= f64::from(policy.capacity)
    }
}

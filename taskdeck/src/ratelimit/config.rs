//! Rate-limit policy table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Operation;
use super::bucket::TokenBucketPolicy;
use super::window::FixedWindowPolicy;

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Default bound on tracked callers per operation.
pub const DEFAULT_MAX_TRACKED_CALLERS: usize = 10_000;

/// Algorithm and parameters for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Token bucket.
    TokenBucket(TokenBucketPolicy),
    /// Fixed window.
    FixedWindow(FixedWindowPolicy),
}

/// A policy that can never admit anything useful.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rate limit for {operation}: {reason}")]
pub struct InvalidPolicy {
    /// Operation the policy was configured for.
    pub operation: Operation,
    /// What is wrong with it.
    pub reason: &'static str,
}

impl RateLimitPolicy {
    fn check(&self, operation: Operation) -> Result<(), InvalidPolicy> {
        let reason = match self {
            Self::TokenBucket(p) if p.capacity == 0 => Some("capacity must be positive"),
            Self::TokenBucket(p) if p.rate == 0 => Some("rate must be positive"),
            Self::TokenBucket(p) if p.period_ms == 0 => Some("period must be positive"),
            Self::FixedWindow(p) if p.limit == 0 => Some("limit must be positive"),
            Self::FixedWindow(p) if p.window_ms == 0 => Some("window must be positive"),
            _ => None,
        };
        reason.map_or(Ok(()), |reason| Err(InvalidPolicy { operation, reason }))
    }
}

/// Policies per operation plus the state bound shared by all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    policies: HashMap<Operation, RateLimitPolicy>,
    /// Maximum number of callers whose state is kept per operation.
    pub max_tracked_callers: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let policies = HashMap::from([
            (
                Operation::CreateTask,
                RateLimitPolicy::TokenBucket(TokenBucketPolicy {
                    rate: 20,
                    period_ms: MINUTE_MS,
                    capacity: 5,
                }),
            ),
            (
                Operation::UpdateTask,
                RateLimitPolicy::TokenBucket(TokenBucketPolicy {
                    rate: 50,
                    period_ms: MINUTE_MS,
                    capacity: 10,
                }),
            ),
            (
                Operation::DeleteTask,
                RateLimitPolicy::TokenBucket(TokenBucketPolicy {
                    rate: 30,
                    period_ms: MINUTE_MS,
                    capacity: 5,
                }),
            ),
            (
                Operation::BulkDelete,
                RateLimitPolicy::FixedWindow(FixedWindowPolicy {
                    limit: 5,
                    window_ms: HOUR_MS,
                }),
            ),
        ]);
        Self {
            policies,
            max_tracked_callers: DEFAULT_MAX_TRACKED_CALLERS,
        }
    }
}

impl RateLimitConfig {
    /// A configuration with no policies: every operation is admitted.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            policies: HashMap::new(),
            max_tracked_callers: DEFAULT_MAX_TRACKED_CALLERS,
        }
    }

    /// Replaces (or adds) the policy for `operation`.
    #[must_use]
    pub fn with_policy(mut self, operation: Operation, policy: RateLimitPolicy) -> Self {
        self.policies.insert(operation, policy);
        self
    }

    /// Sets the per-operation bound on tracked callers.
    #[must_use]
    pub const fn with_max_tracked_callers(mut self, max: usize) -> Self {
        self.max_tracked_callers = max;
        self
    }

    /// Returns the policy configured for `operation`, if any.
    #[must_use]
    pub fn policy(&self, operation: Operation) -> Option<&RateLimitPolicy> {
        self.policies.get(&operation)
    }

    /// Iterates over all configured policies.
    pub fn policies(&self) -> impl Iterator<Item = (Operation, &RateLimitPolicy)> {
        self.policies.iter().map(|(op, policy)| (*op, policy))
    }

    /// Rejects policies that could never admit a call.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidPolicy`] found.
    pub fn validate(&self) -> Result<(), InvalidPolicy> {
        self.policies
            .iter()
            .try_for_each(|(op, policy)| policy.check(*op))
    }
}

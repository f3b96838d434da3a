//! Externally callable task operations.
//!
//! Every operation runs the same pipeline, in this order: resolve the
//! caller, consult the rate limiter, load the target task and check
//! ownership, validate, normalize, then hand off to the store. Cheap checks
//! run before anything that could reveal whether a task exists.

pub mod tasks;

pub use tasks::TaskService;

use taskdeck_proto::task::{TaskId, UserId};
use thiserror::Error;

use crate::ratelimit::RateLimited;
use crate::store::StoreError;
use crate::validate::ValidationError;

/// Capability that yields the authenticated caller, if any.
pub trait Authenticate {
    /// Returns the caller's identity, or `None` when unauthenticated.
    fn caller(&self) -> Option<UserId>;
}

impl Authenticate for UserId {
    fn caller(&self) -> Option<UserId> {
        Some(self.clone())
    }
}

impl Authenticate for Option<UserId> {
    fn caller(&self) -> Option<UserId> {
        self.clone()
    }
}

/// A request that carries no identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Authenticate for Anonymous {
    fn caller(&self) -> Option<UserId> {
        None
    }
}

/// Errors surfaced to callers of the service layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No caller identity could be resolved.
    #[error("not authenticated")]
    Unauthenticated,
    /// The caller is over quota for this operation.
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The task exists but belongs to someone else.
    #[error("not authorized to modify task {0}")]
    Forbidden(TaskId),
    /// A field failed validation.
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),
    /// The storage layer failed for a reason other than a missing row.
    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl ServiceError {
    /// Milliseconds to wait before retrying, for rate-limit rejections.
    #[must_use]
    pub const fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(limited) => Some(limited.retry_after_ms),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

/// Resolves the caller or fails with [`ServiceError::Unauthenticated`].
///
/// # Errors
///
/// [`ServiceError::Unauthenticated`] when `auth` yields no identity.
pub fn require_caller(auth: &impl Authenticate) -> Result<UserId, ServiceError> {
    auth.caller().ok_or(ServiceError::Unauthenticated)
}

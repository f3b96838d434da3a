//! Read-only summary views over the caller's tasks.

use taskdeck_proto::task::{DEFAULT_RECENT_LIMIT, Task, TaskCounts};

use crate::service::{Authenticate, ServiceError, require_caller};
use crate::store::{TaskRepository, TaskStore};

/// Aggregated, read-only views for a dashboard.
pub struct Dashboard<R> {
    store: TaskStore<R>,
    default_limit: usize,
}

impl<R: TaskRepository> Dashboard<R> {
    /// A dashboard returning [`DEFAULT_RECENT_LIMIT`] recent tasks by default.
    #[must_use]
    pub const fn new(store: TaskStore<R>) -> Self {
        Self::with_default_limit(store, DEFAULT_RECENT_LIMIT)
    }

    /// A dashboard with a custom default for [`Dashboard::recent`].
    #[must_use]
    pub const fn with_default_limit(store: TaskStore<R>, default_limit: usize) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    /// Per-status counts of the caller's tasks.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthenticated`].
    pub fn summary(&self, auth: &impl Authenticate) -> Result<TaskCounts, ServiceError> {
        let caller = require_caller(auth)?;
        Ok(self.store.count_by_status(&caller))
    }

    /// The caller's most recently touched tasks, newest update first.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthenticated`].
    pub fn recent(
        &self,
        auth: &impl Authenticate,
        limit: Option<usize>,
    ) -> Result<Vec<Task>, ServiceError> {
        let caller = require_caller(auth)?;
        let limit = limit.unwrap_or(self.default_limit);
        let tasks = self.store.list_recently_updated(&caller, limit);
        tracing::debug!(caller = %caller, limit, count = tasks.len(), "dashboard recent");
        Ok(tasks)
    }
}

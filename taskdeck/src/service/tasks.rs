//! Task endpoints: create, read, update and delete, scoped to the caller.

use std::sync::Arc;

use taskdeck_proto::api::{CreateTaskRequest, DeleteCompletedResponse, TaskWrite, UpdateTaskRequest};
use taskdeck_proto::task::{
    NewTask, Task, TaskCounts, TaskId, TaskPatch, TaskStatus, Timestamp, UserId,
};

use super::{Authenticate, ServiceError, require_caller};
use crate::clock::SharedClock;
use crate::ratelimit::{Operation, RateLimitConfig, RateLimiter};
use crate::store::{TaskRepository, TaskStore};
use crate::validate::{
    self, ValidationLimits, ValidationWarning, normalize_description, normalize_title,
};

/// The task operations exposed to callers.
pub struct TaskService<R> {
    store: TaskStore<R>,
    limiter: Arc<RateLimiter>,
    limits: ValidationLimits,
    clock: SharedClock,
}

impl<R: TaskRepository> TaskService<R> {
    /// Assembles a service from its collaborators.
    #[must_use]
    pub const fn new(
        store: TaskStore<R>,
        limiter: Arc<RateLimiter>,
        limits: ValidationLimits,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            limiter,
            limits,
            clock,
        }
    }

    /// A service over `repo` with the default rate limits and field limits.
    #[must_use]
    pub fn with_defaults(repo: Arc<R>, clock: SharedClock) -> Self {
        let limiter = RateLimiter::new(&RateLimitConfig::default(), Arc::clone(&clock));
        Self::new(
            TaskStore::new(repo, Arc::clone(&clock)),
            Arc::new(limiter),
            ValidationLimits::default(),
            clock,
        )
    }

    /// The store this service writes through.
    #[must_use]
    pub const fn store(&self) -> &TaskStore<R> {
        &self.store
    }

    /// The rate limiter consulted by mutations.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn throttle(&self, operation: Operation, caller: &UserId) -> Result<(), ServiceError> {
        self.limiter.check(operation, caller).map_err(|limited| {
            tracing::warn!(
                caller = %caller,
                operation = %operation,
                retry_after_ms = limited.retry_after_ms,
                "rate limit exceeded"
            );
            ServiceError::from(limited)
        })
    }

    /// Loads a task for mutation by `caller`.
    fn owned_task(&self, caller: &UserId, id: &TaskId) -> Result<Task, ServiceError> {
        let task = self.store.get_by_id(id)?;
        if !task.is_owned_by(caller) {
            tracing::warn!(caller = %caller, task_id = %id, "rejected access to foreign task");
            return Err(ServiceError::Forbidden(*id));
        }
        Ok(task)
    }

    /// Creates a task owned by the caller.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `RateLimited` (`createTask`), or `InvalidInput`.
    pub fn create_task(
        &self,
        auth: &impl Authenticate,
        request: CreateTaskRequest,
    ) -> Result<TaskWrite, ServiceError> {
        let caller = require_caller(auth)?;
        self.throttle(Operation::CreateTask, &caller)?;

        self.limits.validate_title(&request.title)?;
        self.limits
            .validate_description(request.description.as_deref())?;
        let (due_date, warning) = validate::validate_due_date(request.due_date, self.clock.now())?;

        let fields = NewTask {
            title: normalize_title(&request.title),
            description: normalize_description(request.description.as_deref()),
            status: request.status,
            priority: request.priority,
            due_date,
        };
        let task = self.store.create(&caller, fields)?;
        tracing::info!(caller = %caller, task_id = %task.id, "task created");
        Ok(write_result(task, warning))
    }

    /// Returns one of the caller's tasks. A task owned by someone else is
    /// reported as not found.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` or `NotFound`.
    pub fn get_task(&self, auth: &impl Authenticate, id: &TaskId) -> Result<Task, ServiceError> {
        let caller = require_caller(auth)?;
        match self.store.get_by_id(id) {
            Ok(task) if task.is_owned_by(&caller) => Ok(task),
            Ok(_) | Err(_) => Err(ServiceError::NotFound(*id)),
        }
    }

    /// All of the caller's tasks, newest first.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`.
    pub fn list_tasks(&self, auth: &impl Authenticate) -> Result<Vec<Task>, ServiceError> {
        let caller = require_caller(auth)?;
        let tasks = self.store.list_by_owner(&caller);
        tracing::debug!(caller = %caller, count = tasks.len(), "listed tasks");
        Ok(tasks)
    }

    /// The caller's tasks in `status`, newest first.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`.
    pub fn list_tasks_by_status(
        &self,
        auth: &impl Authenticate,
        status: TaskStatus,
    ) -> Result<Vec<Task>, ServiceError> {
        let caller = require_caller(auth)?;
        Ok(self.store.list_by_owner_and_status(&caller, status))
    }

    /// Per-status counts of the caller's tasks.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`.
    pub fn get_task_stats(&self, auth: &impl Authenticate) -> Result<TaskCounts, ServiceError> {
        let caller = require_caller(auth)?;
        Ok(self.store.count_by_status(&caller))
    }

    /// The caller's dated tasks, earliest due first, optionally only those
    /// due at or before `before`.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`.
    pub fn list_upcoming_tasks(
        &self,
        auth: &impl Authenticate,
        before: Option<Timestamp>,
    ) -> Result<Vec<Task>, ServiceError> {
        let caller = require_caller(auth)?;
        Ok(self.store.list_upcoming(&caller, before))
    }

    /// Applies a partial update to one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `RateLimited` (`updateTask`), `NotFound`,
    /// `Forbidden`, or `InvalidInput`.
    pub fn update_task(
        &self,
        auth: &impl Authenticate,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<TaskWrite, ServiceError> {
        let caller = require_caller(auth)?;
        self.throttle(Operation::UpdateTask, &caller)?;
        let existing = self.owned_task(&caller, id)?;

        if let Some(title) = &request.title {
            self.limits.validate_title(title)?;
        }
        self.limits
            .validate_description(request.description.as_deref())?;
        let (due_date, warning) = validate::validate_due_date(request.due_date, self.clock.now())?;
        if let Some(status) = request.status {
            validate::validate_status_transition(existing.status, status)?;
        }

        let patch = TaskPatch {
            title: request.title.as_deref().map(normalize_title),
            description: normalize_description(request.description.as_deref()),
            status: request.status,
            priority: request.priority,
            due_date,
        };
        let task = self.store.patch(id, patch)?;
        tracing::info!(
            caller = %caller,
            task_id = %id,
            status = %task.status,
            "task updated"
        );
        Ok(write_result(task, warning))
    }

    /// Deletes one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `RateLimited` (`deleteTask`), `NotFound`, or
    /// `Forbidden`.
    pub fn delete_task(&self, auth: &impl Authenticate, id: &TaskId) -> Result<(), ServiceError> {
        let caller = require_caller(auth)?;
        self.throttle(Operation::DeleteTask, &caller)?;
        self.owned_task(&caller, id)?;
        self.store.delete(id)?;
        tracing::info!(caller = %caller, task_id = %id, "task deleted");
        Ok(())
    }

    /// Deletes every completed task of the caller, one at a time.
    ///
    /// Each deletion re-checks the status under the store's lock, so a task
    /// reopened or deleted since the listing is skipped. Not atomic: if a
    /// deletion fails the remaining ones are abandoned and the tasks already
    /// removed stay removed. Safe to retry.
    ///
    /// # Errors
    ///
    /// `Unauthenticated`, `RateLimited` (`bulkDelete`), or the first
    /// storage failure.
    pub fn delete_completed_tasks(
        &self,
        auth: &impl Authenticate,
    ) -> Result<DeleteCompletedResponse, ServiceError> {
        let caller = require_caller(auth)?;
        self.throttle(Operation::BulkDelete, &caller)?;

        let completed = self
            .store
            .list_by_owner_and_status(&caller, TaskStatus::Completed);
        let mut deleted_count = 0;
        let mut skipped = 0;
        for (visited, task) in completed.iter().enumerate() {
            match self.store.delete_if_completed(&task.id) {
                Ok(true) => deleted_count += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        caller = %caller,
                        task_id = %task.id,
                        deleted = deleted_count,
                        abandoned = completed.len() - visited,
                        error = %e,
                        "bulk delete stopped part way"
                    );
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            caller = %caller,
            deleted = deleted_count,
            skipped,
            "completed tasks deleted"
        );
        Ok(DeleteCompletedResponse { deleted_count })
    }
}

fn write_result(task: Task, warning: Option<ValidationWarning>) -> TaskWrite {
    TaskWrite {
        task,
        warnings: warning.iter().map(ToString::to_string).collect(),
    }
}

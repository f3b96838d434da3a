//! Task data access.
//!
//! [`TaskRepository`] is the storage seam: a transactional document store
//! with indexed lookup by owner, owner+status and owner+due date. It is the
//! only code that touches rows. [`TaskStore`] builds the task operations on
//! top of it and owns the row invariants: default status, timestamps, and
//! `completed_at` being set exactly when the status is completed.

pub mod memory;

use std::cmp::Ordering;
use std::sync::Arc;

pub use memory::MemoryRepository;

use taskdeck_proto::task::{
    NewTask, Task, TaskCounts, TaskId, TaskPatch, TaskStatus, Timestamp, UserId,
};
use thiserror::Error;

use crate::clock::SharedClock;

/// Errors raised by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No row with this id.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// A row with this id already exists.
    #[error("task already exists: {0}")]
    Duplicate(TaskId),
    /// The backing store could not complete the call.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage collaborator. Every method is atomic with respect to the others.
pub trait TaskRepository: Send + Sync {
    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if the id is taken.
    fn insert(&self, task: Task) -> Result<(), StoreError>;

    /// Point lookup by id.
    fn get(&self, id: &TaskId) -> Option<Task>;

    /// All rows of `owner`, ascending by creation time.
    fn scan_by_owner(&self, owner: &UserId) -> Vec<Task>;

    /// Rows of `owner` in `status`, ascending by creation time.
    fn scan_by_owner_and_status(&self, owner: &UserId, status: TaskStatus) -> Vec<Task>;

    /// Rows of `owner` that have a due date, at or before `before` when
    /// given, ascending by due date.
    fn scan_by_owner_due(&self, owner: &UserId, before: Option<Timestamp>) -> Vec<Task>;

    /// Read-modify-write of one row. `id`, `owner_id` and `created_at` are
    /// preserved whatever `apply` does.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the row does not exist.
    fn update<F>(&self, id: &TaskId, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task);

    /// Deletes one row, returning it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the row does not exist.
    fn remove(&self, id: &TaskId) -> Result<Task, StoreError>;

    /// Deletes one row only if `matches` holds for it. The check and the
    /// removal are one atomic step. Returns `None` when the row was kept.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the row does not exist.
    fn remove_if<P>(&self, id: &TaskId, matches: P) -> Result<Option<Task>, StoreError>
    where
        P: FnOnce(&Task) -> bool;
}

/// Task operations over a shared repository.
pub struct TaskStore<R> {
    repo: Arc<R>,
    clock: SharedClock,
}

impl<R> Clone for TaskStore<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R: TaskRepository> TaskStore<R> {
    /// Creates a store over `repo`, stamping rows with `clock`.
    #[must_use]
    pub fn new(repo: Arc<R>, clock: SharedClock) -> Self {
        Self { repo, clock }
    }

    /// The underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Inserts a new task owned by `owner`.
    ///
    /// Status defaults to todo. A task created directly in the completed
    /// state is stamped `completed_at = created_at`.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the repository.
    pub fn create(&self, owner: &UserId, fields: NewTask) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let status = fields.status.unwrap_or(TaskStatus::Todo);
        let task = Task {
            id: TaskId::new(),
            owner_id: owner.clone(),
            title: fields.title,
            description: fields.description,
            status,
            priority: fields.priority,
            due_date: fields.due_date,
            completed_at: (status == TaskStatus::Completed).then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(task.clone())?;
        Ok(task)
    }

    /// Looks up one task.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no such task exists.
    pub fn get_by_id(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.repo.get(id).ok_or(StoreError::NotFound(*id))
    }

    /// All tasks of `owner`, newest first.
    #[must_use]
    pub fn list_by_owner(&self, owner: &UserId) -> Vec<Task> {
        let mut tasks = self.repo.scan_by_owner(owner);
        tasks.reverse();
        tasks
    }

    /// Tasks of `owner` in `status`, newest first.
    #[must_use]
    pub fn list_by_owner_and_status(&self, owner: &UserId, status: TaskStatus) -> Vec<Task> {
        let mut tasks = self.repo.scan_by_owner_and_status(owner, status);
        tasks.reverse();
        tasks
    }

    /// Tasks of `owner` with a due date (at or before `before` when given),
    /// earliest due first. Undated tasks are excluded.
    #[must_use]
    pub fn list_upcoming(&self, owner: &UserId, before: Option<Timestamp>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .repo
            .scan_by_owner_due(owner, before)
            .into_iter()
            .filter(|t| match (t.due_date, before) {
                (Some(due), Some(bound)) => due <= bound,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .collect();
        tasks.sort_by(|a, b| due_order(a.due_date, b.due_date));
        tasks
    }

    /// Per-status counts over one scan of the owner's tasks.
    #[must_use]
    pub fn count_by_status(&self, owner: &UserId) -> TaskCounts {
        self.repo
            .scan_by_owner(owner)
            .iter()
            .fold(TaskCounts::default(), |mut counts, task| {
                counts.record(task.status);
                counts
            })
    }

    /// The `limit` most recently created tasks of `owner`, newest first.
    #[must_use]
    pub fn list_recent(&self, owner: &UserId, limit: usize) -> Vec<Task> {
        let mut tasks = self.list_by_owner(owner);
        tasks.truncate(limit);
        tasks
    }

    /// The `limit` most recently updated tasks of `owner`, newest first.
    #[must_use]
    pub fn list_recently_updated(&self, owner: &UserId, limit: usize) -> Vec<Task> {
        let mut tasks = self.repo.scan_by_owner(owner);
        tasks.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        tasks.truncate(limit);
        tasks
    }

    /// Applies the fields present in `patch` and refreshes `updated_at`.
    ///
    /// Setting the status to completed stamps `completed_at` with the
    /// mutation time; moving a previously completed task to any other status
    /// clears it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no such task exists.
    pub fn patch(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        let now = self.clock.now();
        self.repo.update(id, move |task| {
            let previous = task.status;
            if let Some(title) = patch.title {
                task.title = title;
            }
            if let Some(description) = patch.description {
                task.description = Some(description);
            }
            if let Some(priority) = patch.priority {
                task.priority = Some(priority);
            }
            if let Some(due) = patch.due_date {
                task.due_date = Some(due);
            }
            if let Some(status) = patch.status {
                task.status = status;
            }

            if patch.status == Some(TaskStatus::Completed) {
                task.completed_at = Some(now);
            } else if previous == TaskStatus::Completed && task.status != TaskStatus::Completed {
                task.completed_at = None;
            }
            task.updated_at = now;
        })
    }

    /// Deletes one task.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no such task exists.
    pub fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        self.repo.remove(id).map(|_| ())
    }

    /// Deletes one task if it is still completed, returning whether it was
    /// removed. A task that is gone or has been reopened is left alone.
    ///
    /// # Errors
    ///
    /// Propagates repository failures other than a row already being gone.
    pub fn delete_if_completed(&self, id: &TaskId) -> Result<bool, StoreError> {
        match self
            .repo
            .remove_if(id, |task| task.status == TaskStatus::Completed)
        {
            Ok(removed) => Ok(removed.is_some()),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes every task of `owner`, returning how many were removed.
    /// Rows that vanish concurrently are not counted.
    ///
    /// # Errors
    ///
    /// Propagates repository failures other than a row already being gone.
    pub fn delete_all_by_owner(&self, owner: &UserId) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for task in self.repo.scan_by_owner(owner) {
            match self.repo.remove(&task.id) {
                Ok(_) => deleted += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}

/// Ascending by due date, tasks without one last.
fn due_order(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

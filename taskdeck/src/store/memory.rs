//! In-memory [`TaskRepository`] with ordered secondary indexes.
//!
//! Rows live in a `HashMap` keyed by id; the owner, owner+status and
//! owner+due-date indexes are `BTreeSet`s of composite keys so every listing
//! is a range scan over matching rows only. One `RwLock` guards rows and
//! indexes together, which makes every repository call atomic.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use taskdeck_proto::task::{Task, TaskId, TaskStatus, Timestamp, UserId};

use super::{StoreError, TaskRepository};

type CreatedKey = (UserId, Timestamp, TaskId);
type StatusKey = (UserId, TaskStatus, Timestamp, TaskId);
type DueKey = (UserId, Timestamp, TaskId);

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<TaskId, Task>,
    by_owner_created: BTreeSet<CreatedKey>,
    by_owner_status: BTreeSet<StatusKey>,
    by_owner_due: BTreeSet<DueKey>,
}

impl Tables {
    fn index(&mut self, task: &Task) {
        self.by_owner_created
            .insert((task.owner_id.clone(), task.created_at, task.id));
        self.by_owner_status.insert((
            task.owner_id.clone(),
            task.status,
            task.created_at,
            task.id,
        ));
        if let Some(due) = task.due_date {
            self.by_owner_due.insert((task.owner_id.clone(), due, task.id));
        }
    }

    fn unindex(&mut self, task: &Task) {
        self.by_owner_created
            .remove(&(task.owner_id.clone(), task.created_at, task.id));
        self.by_owner_status.remove(&(
            task.owner_id.clone(),
            task.status,
            task.created_at,
            task.id,
        ));
        if let Some(due) = task.due_date {
            self.by_owner_due
                .remove(&(task.owner_id.clone(), due, task.id));
        }
    }

    fn rows_for<'a>(&'a self, ids: impl Iterator<Item = &'a TaskId>) -> Vec<Task> {
        ids.filter_map(|id| self.rows.get(id)).cloned().collect()
    }
}

/// Thread-safe in-memory task table.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    /// Returns `true` if no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskRepository for MemoryRepository {
    fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.rows.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id));
        }
        tables.index(&task);
        tables.rows.insert(task.id, task);
        drop(tables);
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Option<Task> {
        self.tables.read().rows.get(id).cloned()
    }

    fn scan_by_owner(&self, owner: &UserId) -> Vec<Task> {
        let tables = self.tables.read();
        let range = (owner.clone(), Timestamp::MIN, TaskId::min())
            ..=(owner.clone(), Timestamp::MAX, TaskId::max());
        tables.rows_for(tables.by_owner_created.range(range).map(|(_, _, id)| id))
    }

    fn scan_by_owner_and_status(&self, owner: &UserId, status: TaskStatus) -> Vec<Task> {
        let tables = self.tables.read();
        let range = (owner.clone(), status, Timestamp::MIN, TaskId::min())
            ..=(owner.clone(), status, Timestamp::MAX, TaskId::max());
        tables.rows_for(tables.by_owner_status.range(range).map(|(_, _, _, id)| id))
    }

    fn scan_by_owner_due(&self, owner: &UserId, before: Option<Timestamp>) -> Vec<Task> {
        let tables = self.tables.read();
        let range = (owner.clone(), Timestamp::MIN, TaskId::min())
            ..=(owner.clone(), before.unwrap_or(Timestamp::MAX), TaskId::max());
        tables.rows_for(tables.by_owner_due.range(range).map(|(_, _, id)| id))
    }

    fn update<F>(&self, id: &TaskId, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let mut tables = self.tables.write();
        let previous = tables
            .rows
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))?;
        let mut task = previous.clone();
        apply(&mut task);
        // Identity and ownership are immutable.
        task.id = previous.id;
        task.owner_id = previous.owner_id.clone();
        task.created_at = previous.created_at;
        tables.unindex(&previous);
        tables.index(&task);
        tables.rows.insert(*id, task.clone());
        drop(tables);
        Ok(task)
    }

    fn remove(&self, id: &TaskId) -> Result<Task, StoreError> {
        let mut tables = self.tables.write();
        let task = tables.rows.remove(id).ok_or(StoreError::NotFound(*id))?;
        tables.unindex(&task);
        drop(tables);
        Ok(task)
    }

    fn remove_if<P>(&self, id: &TaskId, matches: P) -> Result<Option<Task>, StoreError>
    where
        P: FnOnce(&Task) -> bool,
    {
        let mut tables = self.tables.write();
        let row = tables.rows.get(id).ok_or(StoreError::NotFound(*id))?;
        if !matches(row) {
            return Ok(None);
        }
        let task = tables.rows.remove(id).ok_or(StoreError::NotFound(*id))?;
        tables.unindex(&task);
        drop(tables);
        Ok(Some(task))
    }
}

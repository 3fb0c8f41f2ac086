//! # Scheduler
//!
//! Dependency-aware readiness scheduling over a backlog of work items.
//!
//! [`Backlog`] is the command surface. It owns the dependency graph, the
//! per-item pending counts and the ordered ready set behind a single
//! `RwLock`, and persists every change through an [`ItemRepository`] before
//! committing it in memory.
//!
//! ```text
//! Backlog ──write lock──▶ BacklogState ──▶ DependencyGraph   (validate, mutate)
//!                                     ├──▶ ReadinessTracker  (pending counts, ready set)
//!                                     └──▶ ItemRepository    (persist first)
//! ```
//!
//! Claims select the best ready item (highest priority, then earliest
//! creation) and move it to IN_PROGRESS in one critical section, so no two
//! callers can receive the same item.

mod error;
mod readiness;
mod state;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::domain::{Dependency, EdgeChange, ItemId, ItemStatus, NewItem, WorkItem};
use crate::storage::{ItemRepository, MemoryRepository};

pub use error::{BacklogError, Result};
pub use readiness::ReadinessTracker;
pub use state::StatusCounts;

use state::BacklogState;

/// Thread-safe backlog with dependency-aware claiming
pub struct Backlog {
    state: RwLock<BacklogState>,
    repo: Box<dyn ItemRepository>,
}

impl Backlog {
    /// Loads the repository contents and rebuilds readiness
    pub fn open(repo: impl ItemRepository + 'static) -> Result<Self> {
        let snapshot = repo.load()?;
        let state = BacklogState::from_snapshot(snapshot)?;
        debug!("backlog opened");

        Ok(Self {
            state: RwLock::new(state),
            repo: Box::new(repo),
        })
    }

    /// An empty backlog kept entirely in memory
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(BacklogState::new()),
            repo: Box::new(MemoryRepository::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BacklogState>> {
        self.state.read().map_err(|_| BacklogError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BacklogState>> {
        self.state.write().map_err(|_| BacklogError::LockPoisoned)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Creates a TODO item with no prerequisites; it is immediately ready
    pub fn create_item(&self, new: NewItem) -> Result<WorkItem> {
        self.write()?.create_item(new, self.repo.as_ref())
    }

    /// Records that `dependent` cannot start until `prerequisite` is done.
    ///
    /// Rejects unknown ids, self-edges and cycles without changing anything.
    /// Adding an edge that already exists succeeds and changes nothing.
    pub fn add_dependency(&self, dependent: &ItemId, prerequisite: &ItemId) -> Result<EdgeChange> {
        self.write()?
            .add_dependency(dependent, prerequisite, self.repo.as_ref())
    }

    /// Drops an edge, returning false if it did not exist
    pub fn remove_dependency(&self, dependent: &ItemId, prerequisite: &ItemId) -> Result<bool> {
        self.write()?
            .remove_dependency(dependent, prerequisite, self.repo.as_ref())
    }

    /// Moves an item to `status`.
    ///
    /// Accepts an [`ItemStatus`] or a status string; strings outside the
    /// enumeration fail with [`BacklogError::InvalidStatus`].
    pub fn set_status<S>(&self, id: &ItemId, status: S) -> Result<WorkItem>
    where
        S: TryInto<ItemStatus>,
        BacklogError: From<S::Error>,
    {
        let status = status.try_into()?;
        self.write()?.set_status(id, status, self.repo.as_ref())
    }

    /// Claims the best ready item, or `None` when nothing is ready
    pub fn claim_next_ready(&self) -> Result<Option<WorkItem>> {
        self.write()?.claim_next(None, self.repo.as_ref())
    }

    /// Like [`claim_next_ready`](Self::claim_next_ready), recording the worker
    pub fn claim_next_ready_as(&self, worker: &str) -> Result<Option<WorkItem>> {
        self.write()?.claim_next(Some(worker), self.repo.as_ref())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_item(&self, id: &ItemId) -> Result<WorkItem> {
        self.read()?.get_item(id)
    }

    pub fn list_items(&self) -> Result<Vec<WorkItem>> {
        Ok(self.read()?.list_items())
    }

    /// Ready items in claim order
    pub fn ready_items(&self) -> Result<Vec<WorkItem>> {
        Ok(self.read()?.ready_items())
    }

    pub fn blocked_items(&self) -> Result<Vec<WorkItem>> {
        Ok(self.read()?.blocked_items())
    }

    pub fn prerequisites(&self, id: &ItemId) -> Result<Vec<WorkItem>> {
        self.read()?.prerequisites(id)
    }

    pub fn dependents(&self, id: &ItemId) -> Result<Vec<WorkItem>> {
        self.read()?.dependents(id)
    }

    /// Number of prerequisites of `id` that are not done
    pub fn pending_count(&self, id: &ItemId) -> Result<usize> {
        self.read()?.pending_count(id)
    }

    pub fn is_ready(&self, id: &ItemId) -> Result<bool> {
        self.read()?.is_ready(id)
    }

    pub fn counts(&self) -> Result<StatusCounts> {
        Ok(self.read()?.counts())
    }

    /// Every item, prerequisites before dependents
    pub fn topological_order(&self) -> Result<Vec<WorkItem>> {
        Ok(self.read()?.topological_order())
    }

    /// Every recorded dependency edge
    pub fn edges(&self) -> Result<Vec<Dependency>> {
        Ok(self.read()?.edges())
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for Backlog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backlog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Snapshot;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::seconds(offset_secs)
    }

    fn add(backlog: &Backlog, title: &str, priority: i64, t: i64) -> WorkItem {
        backlog
            .create_item(NewItem::new(title).priority(priority).created_at(at(t)))
            .unwrap()
    }

    #[test]
    fn claims_follow_priority_then_creation_time() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 5, 1);
        let b = add(&backlog, "B", 5, 2);
        let c = add(&backlog, "C", 10, 3);

        let order: Vec<_> = (0..3)
            .map(|_| backlog.claim_next_ready().unwrap().unwrap().id)
            .collect();

        assert_eq!(order, vec![c.id, a.id, b.id]);
        assert!(backlog.claim_next_ready().unwrap().is_none());
    }

    #[test]
    fn dependency_gates_claiming() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 100, 2);
        backlog.add_dependency(&b.id, &a.id).unwrap();

        let first = backlog.claim_next_ready().unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(first.status, ItemStatus::InProgress);
        assert!(backlog.claim_next_ready().unwrap().is_none());

        backlog.set_status(&a.id, ItemStatus::Done).unwrap();
        let second = backlog.claim_next_ready().unwrap().unwrap();
        assert_eq!(second.id, b.id);
    }

    #[test]
    fn dependency_on_done_item_does_not_block() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 0, 2);
        backlog.set_status(&a.id, "done").unwrap();

        backlog.add_dependency(&b.id, &a.id).unwrap();

        assert_eq!(backlog.pending_count(&b.id).unwrap(), 0);
        assert!(backlog.is_ready(&b.id).unwrap());
    }

    #[test]
    fn cycle_is_rejected_without_side_effects() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 0, 2);
        let c = add(&backlog, "C", 0, 3);
        backlog.add_dependency(&b.id, &a.id).unwrap();
        backlog.add_dependency(&c.id, &b.id).unwrap();

        let err = backlog.add_dependency(&a.id, &c.id).unwrap_err();
        assert!(matches!(err, BacklogError::CircularDependency { .. }));

        assert!(backlog.is_ready(&a.id).unwrap());
        assert_eq!(backlog.pending_count(&a.id).unwrap(), 0);
        assert!(backlog.prerequisites(&a.id).unwrap().is_empty());
    }

    #[test]
    fn self_dependency_and_unknown_ids_are_rejected() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let ghost = ItemId::generate("ghost", Utc::now(), 99);

        assert!(matches!(
            backlog.add_dependency(&a.id, &a.id),
            Err(BacklogError::SelfDependency(_))
        ));
        assert!(matches!(
            backlog.add_dependency(&a.id, &ghost),
            Err(BacklogError::NotFound(id)) if id == ghost
        ));
        assert!(matches!(
            backlog.get_item(&ghost),
            Err(BacklogError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_edge_counts_once() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 0, 2);

        assert_eq!(backlog.add_dependency(&b.id, &a.id).unwrap(), EdgeChange::Added);
        assert_eq!(
            backlog.add_dependency(&b.id, &a.id).unwrap(),
            EdgeChange::Unchanged
        );
        assert_eq!(backlog.pending_count(&b.id).unwrap(), 1);

        backlog.set_status(&a.id, ItemStatus::Done).unwrap();
        assert!(backlog.is_ready(&b.id).unwrap());
    }

    #[test]
    fn invalid_status_string_is_rejected() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);

        let err = backlog.set_status(&a.id, "blocked").unwrap_err();
        assert!(matches!(err, BacklogError::InvalidStatus(_)));
        assert_eq!(backlog.get_item(&a.id).unwrap().status, ItemStatus::Todo);
    }

    #[test]
    fn reopening_prerequisite_blocks_dependents_again() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 0, 2);
        backlog.add_dependency(&b.id, &a.id).unwrap();
        backlog.set_status(&a.id, ItemStatus::Done).unwrap();
        assert!(backlog.is_ready(&b.id).unwrap());

        backlog.set_status(&a.id, ItemStatus::Review).unwrap();

        assert!(!backlog.is_ready(&b.id).unwrap());
        assert_eq!(backlog.pending_count(&b.id).unwrap(), 1);
        assert_eq!(backlog.blocked_items().unwrap()[0].id, b.id);
    }

    #[test]
    fn returning_to_todo_makes_item_claimable_again() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);

        backlog.claim_next_ready_as("agent-1").unwrap();
        assert!(backlog.claim_next_ready().unwrap().is_none());

        let item = backlog.set_status(&a.id, ItemStatus::Todo).unwrap();
        assert!(item.claimed_by.is_none());

        let again = backlog.claim_next_ready_as("agent-2").unwrap().unwrap();
        assert_eq!(again.claimed_by.as_deref(), Some("agent-2"));
    }

    #[test]
    fn claim_survives_reopen() {
        let repo = Arc::new(MemoryRepository::new());
        let backlog = Backlog::open(Arc::clone(&repo)).unwrap();
        let a = add(&backlog, "A", 1, 1);
        let b = add(&backlog, "B", 0, 2);
        backlog.claim_next_ready_as("worker").unwrap();
        drop(backlog);

        let reopened = Backlog::open(Arc::clone(&repo)).unwrap();
        let claimed = reopened.get_item(&a.id).unwrap();
        assert_eq!(claimed.status, ItemStatus::InProgress);
        assert_eq!(claimed.claimed_by.as_deref(), Some("worker"));

        let next = reopened.claim_next_ready().unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[test]
    fn failed_persistence_leaves_item_ready() {
        let repo = Arc::new(MemoryRepository::new());
        let backlog = Backlog::open(Arc::clone(&repo)).unwrap();
        let a = add(&backlog, "A", 0, 1);

        repo.fail_writes(true);
        assert!(matches!(
            backlog.claim_next_ready(),
            Err(BacklogError::Storage(_))
        ));
        assert!(backlog.is_ready(&a.id).unwrap());
        assert_eq!(
            repo.persisted().unwrap().items[0].status,
            ItemStatus::Todo
        );
    }

    #[test]
    fn corrupt_snapshot_is_rejected_on_open() {
        let a = WorkItem::new(
            ItemId::generate("A", at(0), 1),
            1,
            NewItem::new("A").created_at(at(0)),
        );
        let ghost = ItemId::generate("ghost", at(0), 2);
        let snapshot = Snapshot {
            items: vec![a.clone()],
            edges: vec![crate::domain::Dependency::new(a.id.clone(), ghost)],
        };

        let result = Backlog::open(MemoryRepository::with_snapshot(snapshot));
        assert!(matches!(result, Err(BacklogError::CorruptSnapshot(_))));
    }

    #[test]
    fn topological_order_puts_prerequisites_first() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 0, 2);
        let c = add(&backlog, "C", 0, 3);
        backlog.add_dependency(&a.id, &c.id).unwrap();
        backlog.add_dependency(&c.id, &b.id).unwrap();

        let order: Vec<_> = backlog
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        let pos = |id: &ItemId| order.iter().position(|x| x == id).unwrap();

        assert!(pos(&b.id) < pos(&c.id));
        assert!(pos(&c.id) < pos(&a.id));
    }

    #[test]
    fn edges_reflect_added_and_removed_dependencies() {
        let backlog = Backlog::in_memory();
        let a = add(&backlog, "A", 0, 1);
        let b = add(&backlog, "B", 0, 2);
        let c = add(&backlog, "C", 0, 3);
        backlog.add_dependency(&b.id, &a.id).unwrap();
        backlog.add_dependency(&c.id, &a.id).unwrap();
        backlog.add_dependency(&c.id, &a.id).unwrap();

        let edges = backlog.edges().unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&Dependency::new(b.id.clone(), a.id.clone())));
        assert!(edges.contains(&Dependency::new(c.id.clone(), a.id.clone())));

        backlog.remove_dependency(&b.id, &a.id).unwrap();
        assert_eq!(
            backlog.edges().unwrap(),
            vec![Dependency::new(c.id, a.id)]
        );
    }
}

//! The single mutable backlog state guarded by [`Backlog`](super::Backlog).
//!
//! Every mutation follows the same order: validate against the in-memory
//! graph, persist through the repository, then commit to memory. A failure
//! at either of the first two steps leaves the state untouched.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::error::{BacklogError, Result};
use super::readiness::ReadinessTracker;
use crate::domain::{
    Dependency, DependencyGraph, EdgeChange, ItemId, ItemStatus, NewItem, WorkItem,
};
use crate::storage::{ItemRepository, Snapshot};

/// Item counts per status, plus readiness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub review: usize,
    pub done: usize,
    /// In progress or in review
    pub active: usize,
    pub ready: usize,
    pub blocked: usize,
}

#[derive(Debug)]
pub struct BacklogState {
    items: HashMap<ItemId, WorkItem>,
    graph: DependencyGraph,
    readiness: ReadinessTracker,
    next_seq: u64,
}

impl BacklogState {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            graph: DependencyGraph::new(),
            readiness: ReadinessTracker::new(),
            next_seq: 1,
        }
    }

    /// Rebuilds graph, pending counts and ready set from persisted data
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut items = HashMap::with_capacity(snapshot.items.len());
        for item in snapshot.items {
            let id = item.id.clone();
            if items.insert(id.clone(), item).is_some() {
                return Err(BacklogError::CorruptSnapshot(format!(
                    "duplicate item {}",
                    id
                )));
            }
        }

        let graph = DependencyGraph::from_parts(items.keys(), &snapshot.edges)
            .map_err(|e| BacklogError::CorruptSnapshot(e.to_string()))?;
        let readiness = ReadinessTracker::rebuild(&items, &graph);
        let next_seq = items.values().map(|i| i.seq).max().map_or(1, |s| s + 1);

        debug!(
            items = items.len(),
            edges = graph.edge_count(),
            ready = readiness.len(),
            "rebuilt backlog state"
        );

        Ok(Self {
            items,
            graph,
            readiness,
            next_seq,
        })
    }

    fn item(&self, id: &ItemId) -> Result<&WorkItem> {
        self.items
            .get(id)
            .ok_or_else(|| BacklogError::NotFound(id.clone()))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn create_item(&mut self, new: NewItem, repo: &dyn ItemRepository) -> Result<WorkItem> {
        let seq = self.next_seq;
        let created_at = new.created_at.unwrap_or_else(Utc::now);

        let mut salt = seq;
        let mut id = ItemId::generate(&new.title, created_at, salt);
        while self.items.contains_key(&id) {
            salt = salt.wrapping_add(1 << 32);
            id = ItemId::generate(&new.title, created_at, salt);
        }

        let item = WorkItem::new(id, seq, new.created_at(created_at));
        repo.insert_item(&item)?;

        self.next_seq += 1;
        self.graph.add_item(item.id.clone());
        self.readiness.track(&item, 0);
        self.items.insert(item.id.clone(), item.clone());

        info!(item = %item.id, priority = item.priority, "created work item");
        Ok(item)
    }

    pub fn add_dependency(
        &mut self,
        dependent: &ItemId,
        prerequisite: &ItemId,
        repo: &dyn ItemRepository,
    ) -> Result<EdgeChange> {
        if self.graph.check_dependency(dependent, prerequisite)? == EdgeChange::Unchanged {
            debug!(%dependent, %prerequisite, "dependency already present");
            return Ok(EdgeChange::Unchanged);
        }

        let now_pending = !self.item(prerequisite)?.status.is_complete();
        repo.insert_edge(&Dependency::new(dependent.clone(), prerequisite.clone()))?;

        self.graph.add_dependency(dependent, prerequisite)?;
        self.readiness.on_dependency_added(dependent, now_pending);

        info!(%dependent, %prerequisite, now_pending, "added dependency");
        Ok(EdgeChange::Added)
    }

    pub fn remove_dependency(
        &mut self,
        dependent: &ItemId,
        prerequisite: &ItemId,
        repo: &dyn ItemRepository,
    ) -> Result<bool> {
        self.item(dependent)?;
        let was_pending = !self.item(prerequisite)?.status.is_complete();

        if !self.graph.contains_edge(dependent, prerequisite) {
            return Ok(false);
        }

        repo.remove_edge(&Dependency::new(dependent.clone(), prerequisite.clone()))?;

        self.graph.remove_dependency(dependent, prerequisite);
        let item = self.item(dependent)?.clone();
        self.readiness.on_dependency_removed(&item, was_pending);

        info!(%dependent, %prerequisite, "removed dependency");
        Ok(true)
    }

    pub fn set_status(
        &mut self,
        id: &ItemId,
        status: ItemStatus,
        repo: &dyn ItemRepository,
    ) -> Result<WorkItem> {
        let current = self.item(id)?;
        let previous = current.status;
        if previous == status {
            return Ok(current.clone());
        }

        let mut updated = current.clone();
        updated.set_status(status);
        repo.update_item(&updated)?;

        self.items.insert(id.clone(), updated.clone());
        self.readiness.on_status_changed(&updated);

        if status.is_complete() {
            self.readiness
                .on_prerequisite_completed(id, &self.graph, &self.items);
        } else if previous.is_complete() {
            self.readiness.on_prerequisite_reopened(id, &self.graph);
        }

        info!(item = %id, from = %previous, to = %status, "status changed");
        Ok(updated)
    }

    /// Hands the best ready item to a worker.
    ///
    /// The claim is persisted before the item leaves the ready set, so a
    /// failed write leaves it claimable.
    pub fn claim_next(
        &mut self,
        worker: Option<&str>,
        repo: &dyn ItemRepository,
    ) -> Result<Option<WorkItem>> {
        let Some(id) = self.readiness.peek().cloned() else {
            debug!("ready set empty, nothing to claim");
            return Ok(None);
        };

        let mut claimed = self.item(&id)?.clone();
        claimed.claim(worker);
        repo.update_item(&claimed)?;

        self.items.insert(id.clone(), claimed.clone());
        self.readiness.on_status_changed(&claimed);

        info!(
            item = %id,
            priority = claimed.priority,
            worker = worker.unwrap_or("-"),
            "claimed work item"
        );
        Ok(Some(claimed))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_item(&self, id: &ItemId) -> Result<WorkItem> {
        self.item(id).cloned()
    }

    /// All items in creation order
    pub fn list_items(&self) -> Vec<WorkItem> {
        let mut items: Vec<_> = self.items.values().cloned().collect();
        items.sort_by_key(|i| i.seq);
        items
    }

    /// Ready items in the order they would be claimed
    pub fn ready_items(&self) -> Vec<WorkItem> {
        self.readiness
            .ready_in_order()
            .filter_map(|id| self.items.get(id).cloned())
            .collect()
    }

    /// TODO items still waiting on at least one prerequisite, in creation order
    pub fn blocked_items(&self) -> Vec<WorkItem> {
        let mut blocked: Vec<_> = self
            .items
            .values()
            .filter(|i| i.status.is_pending() && self.readiness.pending_count(&i.id) > 0)
            .cloned()
            .collect();
        blocked.sort_by_key(|i| i.seq);
        blocked
    }

    pub fn prerequisites(&self, id: &ItemId) -> Result<Vec<WorkItem>> {
        self.item(id)?;
        Ok(self.related(self.graph.prerequisites(id)))
    }

    pub fn dependents(&self, id: &ItemId) -> Result<Vec<WorkItem>> {
        self.item(id)?;
        Ok(self.related(self.graph.dependents(id)))
    }

    fn related(&self, ids: Vec<ItemId>) -> Vec<WorkItem> {
        let mut items: Vec<_> = ids
            .iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect();
        items.sort_by_key(|i| i.seq);
        items
    }

    pub fn pending_count(&self, id: &ItemId) -> Result<usize> {
        self.item(id)?;
        Ok(self.readiness.pending_count(id))
    }

    pub fn is_ready(&self, id: &ItemId) -> Result<bool> {
        self.item(id)?;
        Ok(self.readiness.is_ready(id))
    }

    pub fn edges(&self) -> Vec<Dependency> {
        self.graph.edges().collect()
    }

    pub fn topological_order(&self) -> Vec<WorkItem> {
        self.graph
            .topological_order()
            .into_iter()
            .filter_map(|id| self.items.get(&id).cloned())
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            ready: self.readiness.len(),
            ..StatusCounts::default()
        };
        for item in self.items.values() {
            if item.status.is_active() {
                counts.active += 1;
            }
            match item.status {
                ItemStatus::Todo => counts.todo += 1,
                ItemStatus::InProgress => counts.in_progress += 1,
                ItemStatus::Review => counts.review += 1,
                ItemStatus::Done => counts.done += 1,
            }
        }
        counts.blocked = counts.todo - counts.ready;
        counts
    }
}

impl Default for BacklogState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRepository;

    fn setup() -> (BacklogState, MemoryRepository) {
        (BacklogState::new(), MemoryRepository::new())
    }

    #[test]
    fn create_assigns_increasing_sequence() {
        let (mut state, repo) = setup();

        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();

        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
        assert_ne!(a.id, b.id);
        assert_eq!(repo.load().unwrap().items.len(), 2);
    }

    #[test]
    fn identical_inputs_get_distinct_ids() {
        let (mut state, repo) = setup();
        let at = Utc::now();

        let a = state
            .create_item(NewItem::new("same").created_at(at), &repo)
            .unwrap();
        let b = state
            .create_item(NewItem::new("same").created_at(at), &repo)
            .unwrap();

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn counts_group_active_work() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();
        let c = state.create_item(NewItem::new("c"), &repo).unwrap();
        state.create_item(NewItem::new("d"), &repo).unwrap();

        state.set_status(&a.id, ItemStatus::InProgress, &repo).unwrap();
        state.set_status(&b.id, ItemStatus::Review, &repo).unwrap();
        state.set_status(&c.id, ItemStatus::Done, &repo).unwrap();

        let counts = state.counts();
        assert_eq!(counts.active, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.review, 1);
        assert_eq!(counts.todo, 1);
        assert_eq!(counts.ready, 1);
    }

    #[test]
    fn failed_create_changes_nothing() {
        let (mut state, repo) = setup();
        repo.fail_writes(true);

        assert!(state.create_item(NewItem::new("x"), &repo).is_err());
        assert!(state.list_items().is_empty());
        assert_eq!(state.counts(), StatusCounts::default());
    }

    #[test]
    fn failed_edge_write_leaves_graph_unchanged() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();

        repo.fail_writes(true);
        let result = state.add_dependency(&b.id, &a.id, &repo);

        assert!(matches!(result, Err(BacklogError::Storage(_))));
        assert!(state.edges().is_empty());
        assert!(state.is_ready(&b.id).unwrap());
    }

    #[test]
    fn failed_claim_keeps_item_ready() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();

        repo.fail_writes(true);
        assert!(state.claim_next(None, &repo).is_err());
        assert!(state.is_ready(&a.id).unwrap());
        assert_eq!(state.get_item(&a.id).unwrap().status, ItemStatus::Todo);

        repo.fail_writes(false);
        let claimed = state.claim_next(None, &repo).unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
    }

    #[test]
    fn same_status_is_noop() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let d = state.create_item(NewItem::new("d"), &repo).unwrap();
        state.add_dependency(&d.id, &a.id, &repo).unwrap();

        state.set_status(&a.id, ItemStatus::Done, &repo).unwrap();
        state.set_status(&a.id, ItemStatus::Done, &repo).unwrap();

        assert_eq!(state.pending_count(&d.id).unwrap(), 0);
        assert!(state.is_ready(&d.id).unwrap());
    }

    #[test]
    fn remove_dependency_reports_absence() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();

        assert!(!state.remove_dependency(&b.id, &a.id, &repo).unwrap());

        state.add_dependency(&b.id, &a.id, &repo).unwrap();
        assert!(state.remove_dependency(&b.id, &a.id, &repo).unwrap());
        assert!(state.is_ready(&b.id).unwrap());
        assert!(repo.load().unwrap().edges.is_empty());
    }

    #[test]
    fn counts_split_todo_into_ready_and_blocked() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();
        let c = state.create_item(NewItem::new("c"), &repo).unwrap();
        state.add_dependency(&b.id, &a.id, &repo).unwrap();
        state.set_status(&c.id, ItemStatus::Review, &repo).unwrap();

        let counts = state.counts();
        assert_eq!(counts.todo, 2);
        assert_eq!(counts.ready, 1);
        assert_eq!(counts.blocked, 1);
        assert_eq!(counts.review, 1);
    }

    #[test]
    fn snapshot_round_trip_restores_readiness() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();
        let c = state.create_item(NewItem::new("c"), &repo).unwrap();
        state.add_dependency(&b.id, &a.id, &repo).unwrap();
        state.add_dependency(&c.id, &b.id, &repo).unwrap();
        state.set_status(&a.id, ItemStatus::Done, &repo).unwrap();

        let restored = BacklogState::from_snapshot(repo.load().unwrap()).unwrap();

        let ready: Vec<_> = restored.ready_items().into_iter().map(|i| i.id).collect();
        assert_eq!(ready, vec![b.id.clone()]);
        assert_eq!(restored.pending_count(&c.id).unwrap(), 1);
        assert_eq!(restored.next_seq, 4);
    }

    #[test]
    fn snapshot_with_cycle_is_corrupt() {
        let (mut state, repo) = setup();
        let a = state.create_item(NewItem::new("a"), &repo).unwrap();
        let b = state.create_item(NewItem::new("b"), &repo).unwrap();

        let mut snapshot = repo.load().unwrap();
        snapshot.edges = vec![
            Dependency::new(a.id.clone(), b.id.clone()),
            Dependency::new(b.id.clone(), a.id.clone()),
        ];

        let result = BacklogState::from_snapshot(snapshot);
        assert!(matches!(result, Err(BacklogError::CorruptSnapshot(_))));
    }

    #[test]
    fn snapshot_with_duplicate_item_is_corrupt() {
        let (mut state, repo) = setup();
        state.create_item(NewItem::new("a"), &repo).unwrap();

        let mut snapshot = repo.load().unwrap();
        snapshot.items.push(snapshot.items[0].clone());

        let result = BacklogState::from_snapshot(snapshot);
        assert!(matches!(result, Err(BacklogError::CorruptSnapshot(_))));
    }
}

//! Incremental readiness tracking.
//!
//! Keeps, per item, the number of prerequisites that are not yet done, and the
//! live ready set: TODO items whose count is zero. Every hook touches only the
//! item or the direct dependents involved, so the ready set never needs a
//! rescan of the whole backlog.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{DependencyGraph, ItemId, WorkItem};

/// Claim order: highest priority first, then earliest creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyKey {
    priority: Reverse<i64>,
    created_at: DateTime<Utc>,
    seq: u64,
    id: ItemId,
}

impl ReadyKey {
    fn for_item(item: &WorkItem) -> Self {
        Self {
            priority: Reverse(item.priority),
            created_at: item.created_at,
            seq: item.seq,
            id: item.id.clone(),
        }
    }
}

/// Pending-prerequisite counts plus the ordered ready set.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    pending: HashMap<ItemId, usize>,
    ready: BTreeSet<ReadyKey>,
    /// Ready set membership index, for removal by id
    keys: HashMap<ItemId, ReadyKey>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes counts and the ready set from scratch.
    ///
    /// Only used when loading a snapshot; live updates go through the hooks.
    pub fn rebuild(items: &HashMap<ItemId, WorkItem>, graph: &DependencyGraph) -> Self {
        let mut tracker = Self::new();

        for item in items.values() {
            let pending = graph
                .prerequisites(&item.id)
                .iter()
                .filter(|pre| {
                    items
                        .get(*pre)
                        .map(|p| !p.status.is_complete())
                        .unwrap_or(true)
                })
                .count();
            tracker.track(item, pending);
        }

        tracker
    }

    /// Starts tracking an item with a known pending count
    pub fn track(&mut self, item: &WorkItem, pending: usize) {
        self.pending.insert(item.id.clone(), pending);
        self.sync_membership(item);
    }

    /// A new edge `dependent -> prerequisite` was inserted.
    ///
    /// `now_pending` is false when the prerequisite is already done, in which
    /// case the edge contributes nothing.
    pub fn on_dependency_added(&mut self, dependent: &ItemId, now_pending: bool) {
        if !now_pending {
            return;
        }

        let count = self.pending.entry(dependent.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.remove(dependent);
        }
    }

    /// An edge was removed; `was_pending` mirrors `on_dependency_added`.
    pub fn on_dependency_removed(&mut self, dependent: &WorkItem, was_pending: bool) {
        if !was_pending {
            return;
        }

        if self.decrement(&dependent.id) == 0 {
            self.sync_membership(dependent);
        }
    }

    /// `prerequisite` just became done: release its dependents.
    pub fn on_prerequisite_completed(
        &mut self,
        prerequisite: &ItemId,
        graph: &DependencyGraph,
        items: &HashMap<ItemId, WorkItem>,
    ) {
        for dependent in graph.dependents(prerequisite) {
            if self.decrement(&dependent) != 0 {
                continue;
            }
            match items.get(&dependent) {
                Some(item) => self.sync_membership(item),
                None => warn!(item = %dependent, "dependent missing from item map"),
            }
        }
    }

    /// `prerequisite` left done: block its dependents again.
    pub fn on_prerequisite_reopened(&mut self, prerequisite: &ItemId, graph: &DependencyGraph) {
        for dependent in graph.dependents(prerequisite) {
            self.on_dependency_added(&dependent, true);
        }
    }

    /// The item's own status changed; keep its membership in step.
    pub fn on_status_changed(&mut self, item: &WorkItem) {
        self.sync_membership(item);
    }

    /// Best candidate for the next claim, without removing it
    pub fn peek(&self) -> Option<&ItemId> {
        self.ready.first().map(|key| &key.id)
    }

    /// Ready items in claim order
    pub fn ready_in_order(&self) -> impl Iterator<Item = &ItemId> {
        self.ready.iter().map(|key| &key.id)
    }

    pub fn is_ready(&self, id: &ItemId) -> bool {
        self.keys.contains_key(id)
    }

    pub fn pending_count(&self, id: &ItemId) -> usize {
        self.pending.get(id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    fn decrement(&mut self, id: &ItemId) -> usize {
        let count = self.pending.entry(id.clone()).or_insert(0);
        debug_assert!(*count > 0, "pending count underflow for {}", id);
        if *count == 0 {
            warn!(item = %id, "pending count underflow");
        } else {
            *count -= 1;
        }
        *count
    }

    fn sync_membership(&mut self, item: &WorkItem) {
        if item.status.is_pending() && self.pending_count(&item.id) == 0 {
            self.insert(item);
        } else {
            self.remove(&item.id);
        }
    }

    fn insert(&mut self, item: &WorkItem) {
        if self.keys.contains_key(&item.id) {
            return;
        }
        let key = ReadyKey::for_item(item);
        self.ready.insert(key.clone());
        self.keys.insert(item.id.clone(), key);
        debug!(item = %item.id, priority = item.priority, "entered ready set");
    }

    fn remove(&mut self, id: &ItemId) {
        if let Some(key) = self.keys.remove(id) {
            self.ready.remove(&key);
            debug!(item = %id, "left ready set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemStatus, NewItem};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        items: HashMap<ItemId, WorkItem>,
        graph: DependencyGraph,
        tracker: ReadinessTracker,
        seq: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                items: HashMap::new(),
                graph: DependencyGraph::new(),
                tracker: ReadinessTracker::new(),
                seq: 0,
            }
        }

        fn add(&mut self, priority: i64) -> ItemId {
            self.seq += 1;
            let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(self.seq as i64);
            let id = ItemId::generate("item", at, self.seq);
            let item = WorkItem::new(
                id.clone(),
                self.seq,
                NewItem::new("item").priority(priority).created_at(at),
            );
            self.graph.add_item(id.clone());
            self.tracker.track(&item, 0);
            self.items.insert(id.clone(), item);
            id
        }

        fn depend(&mut self, dependent: &ItemId, prerequisite: &ItemId) {
            self.graph.add_dependency(dependent, prerequisite).unwrap();
            let now_pending = !self.items[prerequisite].status.is_complete();
            self.tracker.on_dependency_added(dependent, now_pending);
        }

        fn set(&mut self, id: &ItemId, status: ItemStatus) {
            let previous = self.items[id].status;
            let item = self.items.get_mut(id).unwrap();
            item.set_status(status);
            let item = item.clone();
            self.tracker.on_status_changed(&item);
            if status.is_complete() && !previous.is_complete() {
                self.tracker
                    .on_prerequisite_completed(id, &self.graph, &self.items);
            } else if previous.is_complete() && !status.is_complete() {
                self.tracker.on_prerequisite_reopened(id, &self.graph);
            }
        }

        fn ready(&self) -> Vec<ItemId> {
            self.tracker.ready_in_order().cloned().collect()
        }
    }

    #[test]
    fn new_items_are_ready() {
        let mut fx = Fixture::new();
        let a = fx.add(0);

        assert!(fx.tracker.is_ready(&a));
        assert_eq!(fx.tracker.pending_count(&a), 0);
    }

    #[test]
    fn ready_order_is_priority_then_creation() {
        let mut fx = Fixture::new();
        let a = fx.add(5);
        let b = fx.add(5);
        let c = fx.add(10);

        assert_eq!(fx.ready(), vec![c.clone(), a, b]);
        assert_eq!(fx.tracker.peek(), Some(&c));
    }

    #[test]
    fn dependency_blocks_dependent() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        let d = fx.add(0);

        fx.depend(&d, &a);

        assert_eq!(fx.tracker.pending_count(&d), 1);
        assert!(!fx.tracker.is_ready(&d));
        assert!(fx.tracker.is_ready(&a));
    }

    #[test]
    fn dependency_on_done_item_contributes_nothing() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        let d = fx.add(0);

        fx.set(&a, ItemStatus::Done);
        fx.depend(&d, &a);

        assert_eq!(fx.tracker.pending_count(&d), 0);
        assert!(fx.tracker.is_ready(&d));
    }

    #[test]
    fn completing_prerequisite_releases_dependent() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        let b = fx.add(0);
        let d = fx.add(0);
        fx.depend(&d, &a);
        fx.depend(&d, &b);

        fx.set(&a, ItemStatus::Done);
        assert_eq!(fx.tracker.pending_count(&d), 1);
        assert!(!fx.tracker.is_ready(&d));

        fx.set(&b, ItemStatus::Done);
        assert_eq!(fx.tracker.pending_count(&d), 0);
        assert!(fx.tracker.is_ready(&d));
    }

    #[test]
    fn released_dependent_must_still_be_todo() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        let d = fx.add(0);
        fx.depend(&d, &a);

        fx.set(&d, ItemStatus::Review);
        fx.set(&a, ItemStatus::Done);

        assert_eq!(fx.tracker.pending_count(&d), 0);
        assert!(!fx.tracker.is_ready(&d));

        fx.set(&d, ItemStatus::Todo);
        assert!(fx.tracker.is_ready(&d));
    }

    #[test]
    fn reopening_prerequisite_blocks_again() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        let d = fx.add(0);
        fx.depend(&d, &a);
        fx.set(&a, ItemStatus::Done);
        assert!(fx.tracker.is_ready(&d));

        fx.set(&a, ItemStatus::Todo);

        assert_eq!(fx.tracker.pending_count(&d), 1);
        assert!(!fx.tracker.is_ready(&d));
        assert!(fx.tracker.is_ready(&a));
    }

    #[test]
    fn removing_pending_edge_releases_dependent() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        let d = fx.add(0);
        fx.depend(&d, &a);

        fx.graph.remove_dependency(&d, &a);
        let dependent = fx.items[&d].clone();
        fx.tracker.on_dependency_removed(&dependent, true);

        assert!(fx.tracker.is_ready(&d));
    }

    #[test]
    fn leaving_todo_leaves_ready_set() {
        let mut fx = Fixture::new();
        let a = fx.add(0);

        fx.set(&a, ItemStatus::InProgress);
        assert!(fx.tracker.is_empty());
    }

    #[test]
    fn rebuild_matches_incremental_state() {
        let mut fx = Fixture::new();
        let a = fx.add(1);
        let b = fx.add(2);
        let c = fx.add(3);
        let d = fx.add(4);
        fx.depend(&b, &a);
        fx.depend(&c, &b);
        fx.depend(&d, &a);
        fx.set(&a, ItemStatus::Done);

        let rebuilt = ReadinessTracker::rebuild(&fx.items, &fx.graph);
        let rebuilt_ready: Vec<_> = rebuilt.ready_in_order().cloned().collect();

        assert_eq!(rebuilt_ready, fx.ready());
        for id in [&a, &b, &c, &d] {
            assert_eq!(rebuilt.pending_count(id), fx.tracker.pending_count(id));
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "pending count underflow")]
    fn pending_underflow_fails_loudly() {
        let mut fx = Fixture::new();
        let a = fx.add(0);
        fx.tracker.decrement(&a);
    }
}

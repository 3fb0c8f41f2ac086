//! Persistence port for the scheduler
//!
//! The scheduler only needs to load everything once at startup and to make
//! each change durable before committing it in memory.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::{Dependency, WorkItem};

/// Everything a backlog needs to rebuild its in-memory state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub items: Vec<WorkItem>,
    pub edges: Vec<Dependency>,
}

/// Durable store for work items and dependency edges
///
/// Every write must be durable when the method returns; the scheduler calls
/// these while holding its exclusive lock and only commits in memory after
/// they succeed.
pub trait ItemRepository: Send + Sync {
    /// Loads all items and edges
    fn load(&self) -> Result<Snapshot>;

    /// Persists a newly created item
    fn insert_item(&self, item: &WorkItem) -> Result<()>;

    /// Persists a changed item (status, claim)
    fn update_item(&self, item: &WorkItem) -> Result<()>;

    /// Persists a new edge
    fn insert_edge(&self, edge: &Dependency) -> Result<()>;

    /// Deletes an edge
    fn remove_edge(&self, edge: &Dependency) -> Result<()>;
}

impl<T: ItemRepository + ?Sized> ItemRepository for Arc<T> {
    fn load(&self) -> Result<Snapshot> {
        (**self).load()
    }

    fn insert_item(&self, item: &WorkItem) -> Result<()> {
        (**self).insert_item(item)
    }

    fn update_item(&self, item: &WorkItem) -> Result<()> {
        (**self).update_item(item)
    }

    fn insert_edge(&self, edge: &Dependency) -> Result<()> {
        (**self).insert_edge(edge)
    }

    fn remove_edge(&self, edge: &Dependency) -> Result<()> {
        (**self).remove_edge(edge)
    }
}

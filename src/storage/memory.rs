//! In-memory repository
//!
//! Keeps the snapshot in a mutex. Used for embedding the scheduler without
//! files and throughout the tests; writes can be made to fail on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};

use super::repository::{ItemRepository, Snapshot};
use crate::domain::{Dependency, WorkItem};

#[derive(Debug, Default)]
pub struct MemoryRepository {
    snapshot: Mutex<Snapshot>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing snapshot
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail until switched off again
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of what has been persisted so far
    pub fn persisted(&self) -> Result<Snapshot> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>> {
        self.snapshot
            .lock()
            .map_err(|_| anyhow!("memory repository lock poisoned"))
    }

    fn writable(&self) -> Result<MutexGuard<'_, Snapshot>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory repository is rejecting writes");
        }
        self.lock()
    }
}

impl ItemRepository for MemoryRepository {
    fn load(&self) -> Result<Snapshot> {
        self.persisted()
    }

    fn insert_item(&self, item: &WorkItem) -> Result<()> {
        let mut snapshot = self.writable()?;
        if snapshot.items.iter().any(|i| i.id == item.id) {
            bail!("Item already exists: {}", item.id);
        }
        snapshot.items.push(item.clone());
        Ok(())
    }

    fn update_item(&self, item: &WorkItem) -> Result<()> {
        let mut snapshot = self.writable()?;
        let slot = snapshot
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| anyhow!("Item not persisted: {}", item.id))?;
        *slot = item.clone();
        Ok(())
    }

    fn insert_edge(&self, edge: &Dependency) -> Result<()> {
        let mut snapshot = self.writable()?;
        if !snapshot.edges.contains(edge) {
            snapshot.edges.push(edge.clone());
        }
        Ok(())
    }

    fn remove_edge(&self, edge: &Dependency) -> Result<()> {
        let mut snapshot = self.writable()?;
        snapshot.edges.retain(|e| e != edge);
        Ok(())
    }
}

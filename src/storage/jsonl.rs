//! JSONL storage for work items and edges
//!
//! Items live in `.backlog/items.jsonl` and edges in `.backlog/edges.jsonl`,
//! one JSON object per line. Reads take a shared file lock, writes an
//! exclusive one; full rewrites go through a temp file and an atomic rename.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::repository::{ItemRepository, Snapshot};
use crate::domain::{Dependency, ItemId, WorkItem};

/// File-backed [`ItemRepository`]
#[derive(Debug, Clone)]
pub struct JsonlRepository {
    items_path: PathBuf,
    edges_path: PathBuf,
}

impl JsonlRepository {
    /// Creates a repository storing its files in `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            items_path: dir.join("items.jsonl"),
            edges_path: dir.join("edges.jsonl"),
        }
    }

    /// Creates the default repository for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".backlog"))
    }

    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    pub fn edges_path(&self) -> &Path {
        &self.edges_path
    }

    /// Reads all items, the last line for an id winning
    pub fn read_items(&self) -> Result<Vec<WorkItem>> {
        let mut by_id: HashMap<ItemId, WorkItem> = HashMap::new();
        for item in read_lines::<WorkItem>(&self.items_path)? {
            by_id.insert(item.id.clone(), item);
        }

        let mut items: Vec<_> = by_id.into_values().collect();
        items.sort_by_key(|i| i.seq);
        Ok(items)
    }

    /// Reads all edges, dropping duplicates
    pub fn read_edges(&self) -> Result<Vec<Dependency>> {
        let mut seen = HashSet::new();
        let edges = read_lines::<Dependency>(&self.edges_path)?
            .into_iter()
            .filter(|edge| seen.insert(edge.clone()))
            .collect::<Vec<_>>();
        Ok(edges)
    }

    /// Rewrites both files without superseded or duplicate lines
    pub fn compact(&self) -> Result<usize> {
        let items = self.read_items()?;
        let edges = self.read_edges()?;
        write_all(&self.items_path, &items)?;
        write_all(&self.edges_path, &edges)?;
        Ok(items.len() + edges.len())
    }
}

impl ItemRepository for JsonlRepository {
    fn load(&self) -> Result<Snapshot> {
        let snapshot = Snapshot {
            items: self.read_items()?,
            edges: self.read_edges()?,
        };
        debug!(
            items = snapshot.items.len(),
            edges = snapshot.edges.len(),
            path = %self.items_path.display(),
            "loaded backlog files"
        );
        Ok(snapshot)
    }

    fn insert_item(&self, item: &WorkItem) -> Result<()> {
        append(&self.items_path, item)
    }

    fn update_item(&self, item: &WorkItem) -> Result<()> {
        let mut items = self.read_items()?;
        let Some(slot) = items.iter_mut().find(|i| i.id == item.id) else {
            bail!("Item not persisted: {}", item.id);
        };
        *slot = item.clone();
        write_all(&self.items_path, &items)
    }

    fn insert_edge(&self, edge: &Dependency) -> Result<()> {
        if read_lines::<Dependency>(&self.edges_path)?
            .iter()
            .any(|e| e == edge)
        {
            return Ok(());
        }
        append(&self.edges_path, edge)
    }

    fn remove_edge(&self, edge: &Dependency) -> Result<()> {
        let mut edges = self.read_edges()?;
        let before = edges.len();
        edges.retain(|e| e != edge);
        if edges.len() != before {
            write_all(&self.edges_path, &edges)?;
        }
        Ok(())
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    file.lock_shared()
        .with_context(|| format!("Failed to acquire read lock on {}", path.display()))?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line).with_context(|| {
            format!("Failed to parse {} at line {}", path.display(), line_num + 1)
        })?;
        records.push(record);
    }

    // Lock is released when file is dropped
    Ok(records)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn write_all<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    ensure_parent(path)?;

    let temp_path = path.with_extension("jsonl.tmp");

    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire write lock on {}", temp_path.display()))?;

        let mut writer = BufWriter::new(&file);
        for record in records {
            let line = serde_json::to_string(record).context("Failed to serialize record")?;
            writeln!(writer, "{}", line).context("Failed to write record")?;
        }

        writer.flush().context("Failed to flush records")?;
        file.sync_all().context("Failed to sync records to disk")?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

fn append<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    ensure_parent(path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    file.lock_exclusive()
        .with_context(|| format!("Failed to acquire write lock on {}", path.display()))?;

    let mut writer = BufWriter::new(&file);
    let line = serde_json::to_string(record).context("Failed to serialize record")?;
    writeln!(writer, "{}", line).context("Failed to write record")?;

    writer.flush().context("Failed to flush record")?;
    file.sync_all().context("Failed to sync record to disk")?;

    Ok(())
}

//! Dependency graph for work items
//!
//! Manages `dependent -> prerequisite` relationships with cycle detection and
//! topological ordering. Uses petgraph for storage.
//!
//! Edges are stored pointing from prerequisite to dependent, meaning
//! "prerequisite must be done before dependent". Prerequisites of a node are
//! therefore its incoming neighbours and dependents its outgoing ones.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::id::ItemId;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Adding dependency would create a cycle: {0} -> {1}")]
    CycleDetected(ItemId, ItemId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(ItemId),
}

/// A persisted `dependent -> prerequisite` edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// The item that waits
    pub dependent: ItemId,
    /// The item that must be done first
    pub prerequisite: ItemId,
}

impl Dependency {
    pub fn new(dependent: ItemId, prerequisite: ItemId) -> Self {
        Self {
            dependent,
            prerequisite,
        }
    }
}

/// Outcome of an edge insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChange {
    Added,
    /// The edge already existed
    Unchanged,
}

/// A dependency graph for work items
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<ItemId, ()>,

    /// Map from ItemId to node index
    node_map: HashMap<ItemId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from item IDs and persisted edges
    ///
    /// Edges go through the same validation as live insertions, so a
    /// snapshot with a dangling or cyclic edge is rejected.
    pub fn from_parts<'a>(
        items: impl IntoIterator<Item = &'a ItemId>,
        edges: impl IntoIterator<Item = &'a Dependency>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        for id in items {
            graph.add_item(id.clone());
        }

        for edge in edges {
            graph.add_dependency(&edge.dependent, &edge.prerequisite)?;
        }

        Ok(graph)
    }

    /// Adds an item to the graph
    pub fn add_item(&mut self, item_id: ItemId) {
        if !self.node_map.contains_key(&item_id) {
            let idx = self.graph.add_node(item_id.clone());
            self.node_map.insert(item_id, idx);
        }
    }

    fn index_of(&self, item_id: &ItemId) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(item_id)
            .copied()
            .ok_or_else(|| GraphError::ItemNotFound(item_id.clone()))
    }

    /// Checks an edge without inserting it
    ///
    /// Returns the indices of both endpoints and whether the edge already exists.
    fn validate(
        &self,
        dependent: &ItemId,
        prerequisite: &ItemId,
    ) -> Result<(NodeIndex, NodeIndex, bool), GraphError> {
        let dep_idx = self.index_of(dependent)?;
        let pre_idx = self.index_of(prerequisite)?;

        if dependent == prerequisite {
            return Err(GraphError::SelfDependency(dependent.clone()));
        }

        if self.graph.find_edge(pre_idx, dep_idx).is_some() {
            return Ok((dep_idx, pre_idx, true));
        }

        if self.reaches_through_prerequisites(pre_idx, dep_idx) {
            return Err(GraphError::CycleDetected(
                dependent.clone(),
                prerequisite.clone(),
            ));
        }

        Ok((dep_idx, pre_idx, false))
    }

    /// Depth-first walk from `start` over prerequisite edges looking for `target`
    fn reaches_through_prerequisites(&self, start: NodeIndex, target: NodeIndex) -> bool {
        let mut stack = vec![start];
        let mut visited: HashSet<NodeIndex> = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.extend(
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .filter(|n| !visited.contains(n)),
            );
        }

        false
    }

    /// Adds a dependency edge: `dependent` depends on `prerequisite`
    ///
    /// Fails before touching the graph if either item is unknown, the edge is
    /// a self-loop, or `dependent` is already a (transitive) prerequisite of
    /// `prerequisite`. Re-adding an existing edge is a no-op.
    pub fn add_dependency(
        &mut self,
        dependent: &ItemId,
        prerequisite: &ItemId,
    ) -> Result<EdgeChange, GraphError> {
        let (dep_idx, pre_idx, exists) = self.validate(dependent, prerequisite)?;
        if exists {
            return Ok(EdgeChange::Unchanged);
        }

        self.graph.add_edge(pre_idx, dep_idx, ());
        Ok(EdgeChange::Added)
    }

    /// Returns what [`add_dependency`](Self::add_dependency) would do, without mutating
    pub fn check_dependency(
        &self,
        dependent: &ItemId,
        prerequisite: &ItemId,
    ) -> Result<EdgeChange, GraphError> {
        let (_, _, exists) = self.validate(dependent, prerequisite)?;
        Ok(if exists {
            EdgeChange::Unchanged
        } else {
            EdgeChange::Added
        })
    }

    /// Returns true if adding the edge would close a cycle
    pub fn would_create_cycle(&self, dependent: &ItemId, prerequisite: &ItemId) -> bool {
        matches!(
            self.check_dependency(dependent, prerequisite),
            Err(GraphError::CycleDetected(_, _)) | Err(GraphError::SelfDependency(_))
        )
    }

    /// Removes a dependency edge
    pub fn remove_dependency(&mut self, dependent: &ItemId, prerequisite: &ItemId) -> bool {
        let (Some(&dep_idx), Some(&pre_idx)) =
            (self.node_map.get(dependent), self.node_map.get(prerequisite))
        else {
            return false;
        };

        if let Some(edge) = self.graph.find_edge(pre_idx, dep_idx) {
            self.graph.remove_edge(edge);
            true
        } else {
            false
        }
    }

    /// Returns true if `dependent` directly depends on `prerequisite`
    pub fn contains_edge(&self, dependent: &ItemId, prerequisite: &ItemId) -> bool {
        match (self.node_map.get(dependent), self.node_map.get(prerequisite)) {
            (Some(&dep_idx), Some(&pre_idx)) => self.graph.find_edge(pre_idx, dep_idx).is_some(),
            _ => false,
        }
    }

    fn neighbors(&self, item_id: &ItemId, direction: Direction) -> Vec<ItemId> {
        let Some(&idx) = self.node_map.get(item_id) else {
            return vec![];
        };

        self.graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect()
    }

    /// Returns the direct prerequisites of an item
    pub fn prerequisites(&self, item_id: &ItemId) -> Vec<ItemId> {
        self.neighbors(item_id, Direction::Incoming)
    }

    /// Returns the direct dependents of an item (items that depend on it)
    pub fn dependents(&self, item_id: &ItemId) -> Vec<ItemId> {
        self.neighbors(item_id, Direction::Outgoing)
    }

    /// Iterates over all edges
    pub fn edges(&self) -> impl Iterator<Item = Dependency> + '_ {
        self.graph.edge_references().map(|e| {
            Dependency::new(
                self.graph[e.target()].clone(),
                self.graph[e.source()].clone(),
            )
        })
    }

    /// Returns all items in topological order (prerequisites before dependents)
    pub fn topological_order(&self) -> Vec<ItemId> {
        // Acyclicity is enforced on every insertion
        toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if the graph contains the item
    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.node_map.contains_key(item_id)
    }

    /// Returns the number of items in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Returns the number of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

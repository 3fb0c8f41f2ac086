//! Domain models for the backlog
//!
//! Contains the core data types and the dependency graph, without any I/O
//! or locking concerns.

mod graph;
mod id;
mod item;

pub use graph::{Dependency, DependencyGraph, EdgeChange, GraphError};
pub use id::{IdError, ItemId};
pub use item::{InvalidStatus, ItemStatus, NewItem, WorkItem};

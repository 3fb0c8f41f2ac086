//! backlog - A dependency-aware backlog that hands out ready work
//!
//! Work items are connected by prerequisite edges that must stay acyclic.
//! The scheduler tracks which items are unblocked as edges and statuses
//! change, and lets concurrent workers claim the best ready item without
//! ever handing the same item out twice.

pub mod cli;
pub mod domain;
pub mod logging;
pub mod scheduler;
pub mod storage;

pub use domain::{Dependency, EdgeChange, ItemId, ItemStatus, NewItem, WorkItem};
pub use scheduler::{Backlog, BacklogError, StatusCounts};

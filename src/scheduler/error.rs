//! Errors surfaced by the command surface.

use std::convert::Infallible;

use thiserror::Error;

use crate::domain::{GraphError, InvalidStatus, ItemId};

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(ItemId),

    #[error("Adding dependency would create a cycle: {dependent} -> {prerequisite}")]
    CircularDependency {
        dependent: ItemId,
        prerequisite: ItemId,
    },

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),

    #[error("Stored backlog is inconsistent: {0}")]
    CorruptSnapshot(String),

    #[error("Backlog state lock poisoned by a panicking writer")]
    LockPoisoned,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<GraphError> for BacklogError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::ItemNotFound(id) => BacklogError::NotFound(id),
            GraphError::SelfDependency(id) => BacklogError::SelfDependency(id),
            GraphError::CycleDetected(dependent, prerequisite) => {
                BacklogError::CircularDependency {
                    dependent,
                    prerequisite,
                }
            }
        }
    }
}

impl From<Infallible> for BacklogError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

pub type Result<T> = std::result::Result<T, BacklogError>;

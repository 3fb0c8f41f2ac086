//! Work item domain model
//!
//! Work items are the schedulable units of the backlog. Each carries a
//! priority and a creation order that together decide who gets claimed first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::id::ItemId;

/// A status string outside the fixed enumeration
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid status '{0}': expected one of todo, in_progress, review, done")]
pub struct InvalidStatus(pub String);

/// Status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl ItemStatus {
    /// All statuses in lifecycle order
    pub const ALL: [ItemStatus; 4] = [
        ItemStatus::Todo,
        ItemStatus::InProgress,
        ItemStatus::Review,
        ItemStatus::Done,
    ];

    /// Returns true if this status represents completion
    pub fn is_complete(&self) -> bool {
        matches!(self, ItemStatus::Done)
    }

    /// Returns true if this item is not yet started
    pub fn is_pending(&self) -> bool {
        matches!(self, ItemStatus::Todo)
    }

    /// Returns true if this item is currently being worked on or reviewed
    pub fn is_active(&self) -> bool {
        matches!(self, ItemStatus::InProgress | ItemStatus::Review)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Todo => "todo",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Review => "review",
            ItemStatus::Done => "done",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(ItemStatus::Todo),
            "in_progress" => Ok(ItemStatus::InProgress),
            "review" => Ok(ItemStatus::Review),
            "done" => Ok(ItemStatus::Done),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

impl TryFrom<&str> for ItemStatus {
    type Error = InvalidStatus;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Input for creating a work item
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub title: String,
    pub priority: i64,
    /// Creation time; the store's clock is used when absent
    pub created_at: Option<DateTime<Utc>>,
}

impl NewItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: 0,
            created_at: None,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// A schedulable unit of backlog work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier
    pub id: ItemId,

    /// Human-readable title
    pub title: String,

    /// Higher is more urgent
    #[serde(default)]
    pub priority: i64,

    /// Creation sequence within the backlog, strictly increasing
    pub seq: u64,

    /// Current status
    pub status: ItemStatus,

    /// When the item was created
    pub created_at: DateTime<Utc>,

    /// When the item was last updated
    pub updated_at: DateTime<Utc>,

    /// When the item was completed (if done)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Worker that claimed the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    /// When the item was claimed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Creates a TODO item from creation input
    pub fn new(id: ItemId, seq: u64, new: NewItem) -> Self {
        let created_at = new.created_at.unwrap_or_else(Utc::now);
        Self {
            id,
            title: new.title,
            priority: new.priority,
            seq,
            status: ItemStatus::Todo,
            created_at,
            updated_at: created_at,
            completed_at: None,
            claimed_by: None,
            claimed_at: None,
        }
    }

    /// Applies a status change, returning false when the status is unchanged
    pub fn set_status(&mut self, status: ItemStatus) -> bool {
        if self.status == status {
            return false;
        }

        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        self.completed_at = if status.is_complete() { Some(now) } else { None };

        // Back to the queue: the previous claim no longer holds
        if status.is_pending() {
            self.claimed_by = None;
            self.claimed_at = None;
        }

        true
    }

    /// Transitions TODO -> IN_PROGRESS on behalf of a worker
    pub fn claim(&mut self, worker: Option<&str>) {
        self.set_status(ItemStatus::InProgress);
        self.claimed_by = worker.map(str::to_string);
        self.claimed_at = Some(self.updated_at);
    }

    /// Returns true if the item has been claimed by a worker
    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }
}

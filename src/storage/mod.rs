//! # Storage Layer
//!
//! Persistence behind the scheduler's [`ItemRepository`] port, with
//! git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Work items | JSONL (one JSON per line) | `.backlog/items.jsonl` |
//! | Dependencies | JSONL (`{dependent, prerequisite}`) | `.backlog/edges.jsonl` |
//! | Config | TOML | `.backlog/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`JsonlRepository`] uses file locking (`fs2`) around each read and write
//! - All rewrites are atomic (temp file + rename)
//! - [`Project::lock_exclusive`] serializes whole commands across processes
//!
//! ## Project Structure
//!
//! ```text
//! .backlog/
//! ├── items.jsonl           # All work items
//! ├── edges.jsonl           # Dependency edges
//! ├── config.toml           # Project configuration
//! ├── backlog.lock          # Cross-process command lock
//! └── .gitignore            # Ignores the lock file
//! ```
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a backlog project
//! - [`JsonlRepository`] - Read/write items and edges as JSONL
//! - [`MemoryRepository`] - In-process repository for embedding and tests
//! - [`Config`] - Project and global configuration

mod config;
mod jsonl;
mod memory;
mod project;
mod repository;

pub use config::{AgentConfig, Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig};
pub use jsonl::JsonlRepository;
pub use memory::MemoryRepository;
pub use project::{Project, ProjectError, ProjectLock};
pub use repository::{ItemRepository, Snapshot};

//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project management | `init`, `compact` |
//! | Items | Create and connect work | `add`, `dep`, `undep` |
//! | Status | Move items through the lifecycle | `status`, `start`, `review`, `done`, `reopen` |
//! | Claim | Hand out the next ready item | `claim --as agent-1` |
//! | Query | Inspect backlog state | `show`, `list`, `ready`, `blocked`, `summary`, `order` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr:
//! ```bash
//! backlog --verbose claim
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod item;
mod output;
mod query;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};

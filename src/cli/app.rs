//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use super::output::{Output, OutputFormat};
use super::{item, query};
use crate::domain::ItemStatus;
use crate::logging;
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "backlog")]
#[command(author, version, about = "Dependency-aware backlog that hands out ready work")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true, env = "BACKLOG_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new backlog project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Add a work item
    Add {
        /// Item title
        title: String,

        /// Priority, higher is more urgent (defaults to config default_priority)
        #[arg(long, short, allow_negative_numbers = true)]
        priority: Option<i64>,
    },

    /// Make an item wait for another
    Dep {
        /// Item that will be blocked
        item: String,

        /// Item that must be done first
        depends_on: String,
    },

    /// Remove a dependency
    Undep {
        /// Item to unblock
        item: String,

        /// Dependency to remove
        depends_on: String,
    },

    /// Set an item's status (todo, in_progress, review, done)
    Status {
        /// Item ID
        id: String,

        /// New status
        status: String,
    },

    /// Mark item as in progress
    Start {
        /// Item ID
        id: String,
    },

    /// Mark item as in review
    Review {
        /// Item ID
        id: String,
    },

    /// Mark item as done
    Done {
        /// Item ID
        id: String,
    },

    /// Put item back to todo
    Reopen {
        /// Item ID
        id: String,
    },

    /// Claim the highest-priority ready item
    Claim {
        /// Worker name (defaults to [agent] name, $BACKLOG_AGENT, then $USER)
        #[arg(long = "as", value_name = "NAME")]
        worker: Option<String>,
    },

    /// Show item details
    Show {
        /// Item ID
        id: String,
    },

    /// List items
    List {
        /// Only items with this status
        #[arg(long, short)]
        status: Option<String>,
    },

    /// Show items ready to claim, best first
    Ready,

    /// Show items waiting on prerequisites
    Blocked,

    /// Show counts per status
    Summary,

    /// Show all items with prerequisites first
    Order {
        /// List dependency edges instead of items
        #[arg(long)]
        edges: bool,
    },

    /// Rewrite the backlog files without superseded lines
    Compact,
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load();
    let config_level = config
        .as_ref()
        .ok()
        .and_then(|c| c.project.log_level.clone());
    logging::init_logging(cli.verbose, config_level.as_deref())?;

    let config = config.unwrap_or_else(|e| {
        warn!("ignoring unreadable configuration: {:#}", e);
        Config::default()
    });

    let format = cli
        .format
        .unwrap_or_else(|| config.global.default_format.into());
    let output = Output::new(format);

    debug!(?format, "backlog starting");

    match cli.command {
        Commands::Init { path } => {
            let project = Project::init(&path)?;
            debug!(dir = %project.backlog_dir().display(), "created backlog directory");
            output.success(&format!(
                "Initialized backlog at {}",
                project.root().display()
            ));
        }

        Commands::Add { title, priority } => item::add(&output, &title, priority)?,
        Commands::Dep {
            item: dependent,
            depends_on,
        } => item::add_dependency(&output, &dependent, &depends_on)?,
        Commands::Undep {
            item: dependent,
            depends_on,
        } => item::remove_dependency(&output, &dependent, &depends_on)?,

        Commands::Status { id, status } => item::set_status(&output, &id, &status)?,
        Commands::Start { id } => item::transition(&output, &id, ItemStatus::InProgress)?,
        Commands::Review { id } => item::transition(&output, &id, ItemStatus::Review)?,
        Commands::Done { id } => item::transition(&output, &id, ItemStatus::Done)?,
        Commands::Reopen { id } => item::transition(&output, &id, ItemStatus::Todo)?,

        Commands::Claim { worker } => item::claim(&output, worker.as_deref())?,

        Commands::Show { id } => query::show(&output, &id)?,
        Commands::List { status } => query::list(&output, status.as_deref())?,
        Commands::Ready => query::ready(&output)?,
        Commands::Blocked => query::blocked(&output)?,
        Commands::Summary => query::summary(&output)?,
        Commands::Order { edges } => query::order(&output, edges)?,

        Commands::Compact => item::compact(&output)?,
    }

    debug!("command completed");
    Ok(())
}

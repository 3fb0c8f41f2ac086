//! Mutating commands: add, dependencies, status changes and claims
//!
//! Each command holds the exclusive project lock from load to persist, so
//! concurrent invocations see each other's changes in order.

use anyhow::Result;
use tracing::warn;

use super::output::Output;
use crate::domain::{EdgeChange, ItemId, ItemStatus, NewItem, WorkItem};
use crate::scheduler::Backlog;
use crate::storage::{Project, ProjectLock};

/// Opens the current project's backlog under the exclusive lock
fn open_for_write() -> Result<(Project, ProjectLock, Backlog)> {
    let project = Project::open_current()?;
    let lock = project.lock_exclusive()?;
    let backlog = Backlog::open(project.repository())?;
    Ok((project, lock, backlog))
}

pub fn add(output: &Output, title: &str, priority: Option<i64>) -> Result<()> {
    let (project, _lock, backlog) = open_for_write()?;
    let priority = priority.unwrap_or(project.config().project.default_priority);

    let item = backlog.create_item(NewItem::new(title).priority(priority))?;

    if output.is_json() {
        output.data(&item);
    } else {
        output.success(&format!(
            "Created item: {} - {} (priority {})",
            item.id, item.title, item.priority
        ));
    }

    Ok(())
}

pub fn add_dependency(output: &Output, item: &str, depends_on: &str) -> Result<()> {
    let dependent: ItemId = item.parse()?;
    let prerequisite: ItemId = depends_on.parse()?;
    let (_project, _lock, backlog) = open_for_write()?;

    let change = backlog.add_dependency(&dependent, &prerequisite).inspect_err(|e| {
        warn!(%dependent, %prerequisite, error = %e, "dependency rejected");
    })?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "dependent": dependent,
            "prerequisite": prerequisite,
            "added": change == EdgeChange::Added,
        }));
    } else if change == EdgeChange::Added {
        output.success(&format!("{} now depends on {}", dependent, prerequisite));
    } else {
        output.success(&format!(
            "{} already depends on {}",
            dependent, prerequisite
        ));
    }

    Ok(())
}

pub fn remove_dependency(output: &Output, item: &str, depends_on: &str) -> Result<()> {
    let dependent: ItemId = item.parse()?;
    let prerequisite: ItemId = depends_on.parse()?;
    let (_project, _lock, backlog) = open_for_write()?;

    let removed = backlog.remove_dependency(&dependent, &prerequisite)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "dependent": dependent,
            "prerequisite": prerequisite,
            "removed": removed,
        }));
    } else if removed {
        output.success(&format!(
            "Removed dependency: {} no longer depends on {}",
            dependent, prerequisite
        ));
    } else {
        output.success(&format!(
            "No dependency: {} does not depend on {}",
            dependent, prerequisite
        ));
    }

    Ok(())
}

/// Sets any status given as a string, e.g. `backlog status w-1a2b3c4 review`
pub fn set_status(output: &Output, id: &str, status: &str) -> Result<()> {
    let id: ItemId = id.parse()?;
    let (_project, _lock, backlog) = open_for_write()?;

    let item = backlog.set_status(&id, status)?;
    report_status(output, &backlog, &item)
}

/// Shortcut commands (`start`, `review`, `done`, `reopen`)
pub fn transition(output: &Output, id: &str, status: ItemStatus) -> Result<()> {
    let id: ItemId = id.parse()?;
    let (_project, _lock, backlog) = open_for_write()?;

    let item = backlog.set_status(&id, status)?;
    report_status(output, &backlog, &item)
}

fn report_status(output: &Output, backlog: &Backlog, item: &WorkItem) -> Result<()> {
    if output.is_json() {
        output.data(item);
        return Ok(());
    }

    output.success(&format!("{} is now {}", item.id, item.status));

    if item.status.is_complete() {
        let unblocked: Vec<_> = backlog
            .dependents(&item.id)?
            .into_iter()
            .filter(|d| backlog.is_ready(&d.id).unwrap_or(false))
            .collect();
        if !unblocked.is_empty() {
            println!("Unblocked:");
            for dep in unblocked {
                println!("  {} - {}", dep.id, dep.title);
            }
        }
    }

    Ok(())
}

/// Claims the best ready item for a worker
pub fn claim(output: &Output, worker: Option<&str>) -> Result<()> {
    let (project, _lock, backlog) = open_for_write()?;
    let worker = worker
        .map(str::to_string)
        .unwrap_or_else(|| project.config().project.agent.effective_name());

    let claimed = backlog.claim_next_ready_as(&worker)?;

    if output.is_json() {
        output.data(&claimed);
        return Ok(());
    }

    match claimed {
        Some(item) => {
            output.success(&format!("Claimed {} - {}", item.id, item.title));
            println!("  priority: {}", item.priority);
            println!("  worker:   {}", worker);
        }
        None => println!("No items ready to claim."),
    }

    Ok(())
}

/// Rewrites the backlog files without superseded lines
pub fn compact(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let _lock = project.lock_exclusive()?;

    let records = project.repository().compact()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "records": records }));
    } else {
        output.success(&format!("Compacted backlog files ({} records)", records));
    }

    Ok(())
}

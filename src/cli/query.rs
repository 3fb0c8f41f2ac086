//! Query commands (show, list, ready, blocked, summary, order)
//!
//! These only take the shared project lock, so they can run alongside each
//! other but never observe a half-finished mutation.

use anyhow::Result;

use super::output::Output;
use crate::domain::{ItemId, ItemStatus, WorkItem};
use crate::scheduler::Backlog;
use crate::storage::{Project, ProjectLock};

fn open_for_read() -> Result<(ProjectLock, Backlog)> {
    let project = Project::open_current()?;
    let lock = project.lock_shared()?;
    let backlog = Backlog::open(project.repository())?;
    Ok((lock, backlog))
}

fn ids(items: &[WorkItem]) -> Vec<String> {
    items.iter().map(|i| i.id.to_string()).collect()
}

/// Show item details with its dependencies
pub fn show(output: &Output, id: &str) -> Result<()> {
    let id: ItemId = id.parse()?;
    let (_lock, backlog) = open_for_read()?;

    let item = backlog.get_item(&id)?;
    let prerequisites = backlog.prerequisites(&id)?;
    let dependents = backlog.dependents(&id)?;
    let pending = backlog.pending_count(&id)?;
    let ready = backlog.is_ready(&id)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "item": item,
            "prerequisites": ids(&prerequisites),
            "dependents": ids(&dependents),
            "pending": pending,
            "ready": ready,
        }));
        return Ok(());
    }

    println!("Item: {}", item.id);
    println!("Title: {}", item.title);
    println!("Priority: {}", item.priority);
    println!("Status: {}", item.status);
    println!("Created: {}", item.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(completed) = item.completed_at {
        println!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let (Some(worker), Some(at)) = (&item.claimed_by, item.claimed_at) {
        println!(
            "Claimed by: {} at {}",
            worker,
            at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if ready {
        println!("Ready: yes");
    } else if item.status.is_pending() {
        println!("Ready: no ({} pending prerequisite(s))", pending);
    }

    if !prerequisites.is_empty() {
        println!();
        println!("Depends on:");
        for pre in &prerequisites {
            let mark = if pre.status.is_complete() { "x" } else { " " };
            println!("  [{}] {} - {}", mark, pre.id, pre.title);
        }
    }

    if !dependents.is_empty() {
        println!();
        println!("Required by:");
        for dep in &dependents {
            println!("  {} - {}", dep.id, dep.title);
        }
    }

    Ok(())
}

/// List all items, optionally filtered by status
pub fn list(output: &Output, status: Option<&str>) -> Result<()> {
    let filter = status.map(str::parse::<ItemStatus>).transpose()?;
    let (_lock, backlog) = open_for_read()?;

    let items: Vec<_> = backlog
        .list_items()?
        .into_iter()
        .filter(|i| filter.map_or(true, |s| i.status == s))
        .collect();

    if output.is_json() {
        output.data(&items);
    } else if items.is_empty() {
        match filter {
            Some(s) => println!("No {} items", s),
            None => println!("No items"),
        }
    } else {
        output.item_table(&items);
    }

    Ok(())
}

/// Show items ready to claim, in claim order
pub fn ready(output: &Output) -> Result<()> {
    let (_lock, backlog) = open_for_read()?;
    let items = backlog.ready_items()?;

    if output.is_json() {
        output.data(&items);
    } else if items.is_empty() {
        println!("No items ready to claim.");
    } else {
        println!("Ready items ({}):", items.len());
        output.item_table(&items);
    }

    Ok(())
}

/// Show TODO items waiting on prerequisites
pub fn blocked(output: &Output) -> Result<()> {
    let (_lock, backlog) = open_for_read()?;
    let items = backlog.blocked_items()?;

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let blockers: Vec<_> = backlog
            .prerequisites(&item.id)?
            .into_iter()
            .filter(|p| !p.status.is_complete())
            .map(|p| p.id.to_string())
            .collect();
        rows.push((item, blockers));
    }

    if output.is_json() {
        let data: Vec<_> = rows
            .iter()
            .map(|(item, blockers)| {
                serde_json::json!({
                    "id": item.id,
                    "title": item.title,
                    "priority": item.priority,
                    "blocked_by": blockers,
                })
            })
            .collect();
        output.data(&data);
    } else if rows.is_empty() {
        println!("No blocked items.");
    } else {
        println!("Blocked items ({}):", rows.len());
        println!("{:<11} {:<30} BLOCKED BY", "ID", "TITLE");
        println!("{}", "-".repeat(70));
        for (item, blockers) in rows {
            println!("{:<11} {:<30} {}", item.id, item.title, blockers.join(", "));
        }
    }

    Ok(())
}

/// Show counts per status
pub fn summary(output: &Output) -> Result<()> {
    let (_lock, backlog) = open_for_read()?;
    let counts = backlog.counts()?;

    if output.is_json() {
        output.data(&counts);
        return Ok(());
    }

    let total = counts.todo + counts.in_progress + counts.review + counts.done;
    println!("Backlog Summary");
    println!("{}", "=".repeat(40));
    println!();
    println!("Items: {} total", total);
    println!("  [ ] Todo:        {}", counts.todo);
    println!("  [~] In Progress: {}", counts.in_progress);
    println!("  [?] Review:      {}", counts.review);
    println!("  [x] Done:        {}", counts.done);
    println!();
    println!("  Active:          {}", counts.active);
    println!("  Ready to claim:  {}", counts.ready);
    println!("  Blocked:         {}", counts.blocked);

    Ok(())
}

/// Show every item with prerequisites before dependents
pub fn order(output: &Output, edges: bool) -> Result<()> {
    let (_lock, backlog) = open_for_read()?;
    if edges {
        return order_edges(output, &backlog);
    }

    let items = backlog.topological_order()?;

    if output.is_json() {
        output.data(&items);
    } else if items.is_empty() {
        println!("No items");
    } else {
        output.item_table(&items);
    }

    Ok(())
}

fn order_edges(output: &Output, backlog: &Backlog) -> Result<()> {
    let edges = backlog.edges()?;

    if output.is_json() {
        output.data(&edges);
    } else if edges.is_empty() {
        println!("No dependencies");
    } else {
        println!("{:<11}    {}", "ITEM", "DEPENDS ON");
        for edge in &edges {
            println!("{:<11} -> {}", edge.dependent, edge.prerequisite);
        }
    }

    Ok(())
}

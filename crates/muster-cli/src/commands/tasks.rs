//! Task graph commands
//!
//! Every task argument accepts a unique id prefix.

use crate::console::CliConsole;
use anyhow::Result;
use muster_core::{NewTask, Task, TaskPriority, TaskStatus, TeamLeader};

/// Arguments of `create-task`
pub struct CreateTaskArgs {
    pub subject: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub priority: String,
    pub blocked_by: Vec<String>,
    pub blocks: Vec<String>,
}

async fn resolve_id(leader: &TeamLeader, team: &str, id_or_prefix: &str) -> Result<String> {
    Ok(leader.tasks().resolve(team, id_or_prefix).await?.id)
}

async fn resolve_all(leader: &TeamLeader, team: &str, ids: &[String]) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        resolved.push(resolve_id(leader, team, id).await?);
    }
    Ok(resolved)
}

fn report(console: &CliConsole, task: &Task, verb: &str) -> Result<()> {
    if console.emit_json(serde_json::to_value(task)?) {
        return Ok(());
    }
    console.success(&format!("{verb} task '{}' ({})", task.subject, task.id));
    Ok(())
}

pub async fn create(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    args: CreateTaskArgs,
) -> Result<()> {
    let priority: TaskPriority = args.priority.parse()?;
    let mut new = NewTask::new(args.subject)
        .priority(priority)
        .blocked_by(resolve_all(leader, team, &args.blocked_by).await?)
        .blocks(resolve_all(leader, team, &args.blocks).await?);
    if let Some(description) = args.description {
        new = new.description(description);
    }
    if let Some(owner) = args.owner {
        new = new.owner(owner);
    }

    let task = leader.create_task(team, new).await?;
    report(console, &task, "Created")
}

pub async fn transition(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    task: &str,
    status: &str,
) -> Result<()> {
    let next: TaskStatus = status.parse()?;
    let id = resolve_id(leader, team, task).await?;
    let task = leader.transition_task(team, &id, next).await?;
    report(console, &task, &format!("Moved to {next}:"))
}

pub async fn assign(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    task: &str,
    owner: Option<&str>,
) -> Result<()> {
    let id = resolve_id(leader, team, task).await?;
    let task = leader.assign_task(team, &id, owner).await?;
    match &task.owner {
        Some(owner) => report(console, &task, &format!("Assigned to '{owner}':")),
        None => report(console, &task, "Unassigned"),
    }
}

pub async fn add_dependency(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    task: &str,
    blocker: &str,
) -> Result<()> {
    let id = resolve_id(leader, team, task).await?;
    let blocker = resolve_id(leader, team, blocker).await?;
    let task = leader.add_dependency(team, &id, &blocker).await?;
    report(console, &task, "Added blocker to")
}

pub async fn remove_dependency(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    task: &str,
    blocker: &str,
) -> Result<()> {
    let id = resolve_id(leader, team, task).await?;
    let blocker = resolve_id(leader, team, blocker).await?;
    let task = leader.remove_dependency(team, &id, &blocker).await?;
    report(console, &task, "Removed blocker from")
}

pub async fn blockers(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    task: &str,
) -> Result<()> {
    let id = resolve_id(leader, team, task).await?;
    let blockers = leader.list_blockers(team, &id).await?;
    if console.emit_json(serde_json::to_value(&blockers)?) {
        return Ok(());
    }
    if blockers.is_empty() {
        console.success("Nothing blocks this task");
        return Ok(());
    }
    console.print_header("Blocked by");
    for blocker in &blockers {
        console.print_task(blocker);
    }
    Ok(())
}

pub async fn list(leader: &TeamLeader, console: &CliConsole, team: &str) -> Result<()> {
    let tasks = leader.list_tasks(team).await?;
    if console.emit_json(serde_json::to_value(&tasks)?) {
        return Ok(());
    }
    console.print_header(&format!("Tasks of '{team}'"));
    if tasks.is_empty() {
        console.warn("No tasks yet");
    }
    for task in &tasks {
        console.print_task(task);
    }
    Ok(())
}

//! Worker-side commands
//!
//! These run inside a spawned worker (or a shell standing in for one) and act
//! only on the caller's own mailbox and tasks.

use crate::console::CliConsole;
use anyhow::Result;
use muster_core::{CooperativeWorker, EmbeddedWorker, TaskStatus, WorkerClient};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the cooperative loop until a shutdown request or a signal arrives
pub async fn run(client: WorkerClient) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    info!(team = %client.team(), member = %client.member_id(), "worker loop started");
    let result = CooperativeWorker.run(client, cancel).await;
    watcher.abort();
    result?;
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("signal received, stopping worker loop");
    cancel.cancel();
}

pub async fn inbox(client: &WorkerClient, console: &CliConsole, wait_secs: u64) -> Result<()> {
    let entries = if wait_secs == 0 {
        client.receive().await?
    } else {
        client
            .wait_for_messages(Duration::from_secs(wait_secs))
            .await?
    };
    if console.emit_json(serde_json::to_value(&entries)?) {
        return Ok(());
    }
    if entries.is_empty() {
        console.info("No new messages");
    }
    for entry in &entries {
        console.print_entry(entry);
    }
    Ok(())
}

pub async fn send(
    client: &WorkerClient,
    console: &CliConsole,
    to: &str,
    body: &str,
    summary: Option<&str>,
) -> Result<()> {
    let sent = client.send(to, body, summary).await?;
    if console.emit_json(serde_json::to_value(&sent)?) {
        return Ok(());
    }
    console.success(&format!("Delivered {} message(s) to '{to}'", sent.len()));
    Ok(())
}

pub async fn respond_shutdown(
    client: &WorkerClient,
    console: &CliConsole,
    request_id: &str,
    approve: bool,
    reason: Option<&str>,
) -> Result<()> {
    let entry = client.respond_shutdown(request_id, approve, reason).await?;
    if console.emit_json(serde_json::to_value(&entry)?) {
        return Ok(());
    }
    if approve {
        console.success("Shutdown approved");
    } else {
        console.warn("Shutdown denied");
    }
    Ok(())
}

pub async fn idle(client: &WorkerClient, console: &CliConsole, message: &str) -> Result<()> {
    client.notify_idle(message).await?;
    console.success("Leader notified");
    Ok(())
}

pub async fn tasks(client: &WorkerClient, console: &CliConsole) -> Result<()> {
    let tasks = client.my_tasks().await?;
    if console.emit_json(serde_json::to_value(&tasks)?) {
        return Ok(());
    }
    console.print_header(&format!("Tasks of '{}'", client.member_id()));
    if tasks.is_empty() {
        console.warn("Nothing assigned");
    }
    for task in &tasks {
        console.print_task(task);
    }
    Ok(())
}

pub async fn transition(
    client: &WorkerClient,
    console: &CliConsole,
    task: &str,
    next: TaskStatus,
) -> Result<()> {
    let task = client.transition(task, next).await?;
    if console.emit_json(serde_json::to_value(&task)?) {
        return Ok(());
    }
    console.success(&format!("'{}' is now {}", task.subject, task.status));
    Ok(())
}

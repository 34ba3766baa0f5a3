//! Leader-side messaging commands

use crate::console::CliConsole;
use anyhow::Result;
use muster_core::TeamLeader;

pub async fn send(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    from: &str,
    to: &str,
    body: &str,
    summary: Option<&str>,
) -> Result<()> {
    let sent = leader.send_message(team, from, to, body, summary).await?;
    if console.emit_json(serde_json::to_value(&sent)?) {
        return Ok(());
    }
    console.success(&format!("Delivered {} message(s) to '{to}'", sent.len()));
    Ok(())
}

pub async fn peek(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    mailbox: &str,
    count: usize,
) -> Result<()> {
    let entries = leader.peek(team, mailbox, count).await?;
    if console.emit_json(serde_json::to_value(&entries)?) {
        return Ok(());
    }
    console.print_header(&format!("Mailbox '{mailbox}'"));
    if entries.is_empty() {
        console.warn("Mailbox is empty");
    }
    for entry in &entries {
        console.print_entry(entry);
    }
    Ok(())
}

pub async fn receive(leader: &TeamLeader, console: &CliConsole, team: &str) -> Result<()> {
    let entries = leader.receive(team).await?;
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

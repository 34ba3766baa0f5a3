//! Team lifecycle and membership commands

use crate::console::CliConsole;
use anyhow::Result;
use muster_core::{MemberSpec, TeamLeader};

pub async fn create(
    leader: &TeamLeader,
    console: &CliConsole,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    let team = leader.create_team(name, description).await?;
    if console.emit_json(serde_json::to_value(&team)?) {
        return Ok(());
    }
    console.success(&format!("Created team '{}'", team.name));
    console.info(&format!(
        "Descriptor: {}",
        leader.layout().team_config(&team.name).display()
    ));
    Ok(())
}

pub async fn list(leader: &TeamLeader, console: &CliConsole) -> Result<()> {
    let teams = leader.list_teams().await?;
    if console.emit_json(serde_json::to_value(&teams)?) {
        return Ok(());
    }
    if teams.is_empty() {
        console.warn("No teams found");
        return Ok(());
    }
    console.print_header("Teams");
    for team in &teams {
        console.print_team(team);
    }
    Ok(())
}

pub async fn delete(
    leader: &TeamLeader,
    console: &CliConsole,
    name: &str,
    force: bool,
) -> Result<()> {
    let report = leader.delete_team(name, force).await?;
    if console.emit_json(serde_json::to_value(&report)?) {
        return Ok(());
    }
    for member in &report.approved {
        console.info(&format!("'{member}' approved shutdown"));
    }
    for member in report.unresolved() {
        console.warn(&format!("'{member}' did not approve and was terminated"));
    }
    console.success(&format!("Deleted team '{name}'"));
    Ok(())
}

pub async fn add_member(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    spec: MemberSpec,
) -> Result<()> {
    let member = leader.add_member(team, &spec).await?;
    if console.emit_json(serde_json::to_value(&member)?) {
        return Ok(());
    }
    let placement = member
        .process_handle
        .as_ref()
        .map(|h| h.to_string())
        .unwrap_or_else(|| member.execution_mode.to_string());
    console.success(&format!(
        "'{}' joined '{}' as {} ({})",
        member.id, team, member.role_type, placement
    ));
    Ok(())
}

pub async fn status(leader: &TeamLeader, console: &CliConsole, team: &str) -> Result<()> {
    let statuses = leader.status(team).await?;
    if console.emit_json(serde_json::to_value(&statuses)?) {
        return Ok(());
    }
    console.print_header(&format!("Team '{team}'"));
    if statuses.is_empty() {
        console.warn("No members yet");
    }
    for status in &statuses {
        console.print_status(status);
    }
    Ok(())
}

pub async fn reconcile(leader: &TeamLeader, console: &CliConsole, team: &str) -> Result<()> {
    let deactivated = leader.reconcile(team).await?;
    if console.emit_json(serde_json::to_value(&deactivated)?) {
        return Ok(());
    }
    if deactivated.is_empty() {
        console.success("Registry matches the running workers");
    } else {
        console.warn(&format!(
            "Deactivated offline member(s): {}",
            deactivated.join(", ")
        ));
    }
    Ok(())
}

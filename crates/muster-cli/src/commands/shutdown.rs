//! Shutdown commands

use crate::console::CliConsole;
use anyhow::Result;
use muster_core::{MusterError, TeamLeader};

pub async fn request(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    member: &str,
) -> Result<()> {
    console.info(&format!(
        "Waiting up to {:?} for '{member}' to answer",
        leader.config().timeouts.shutdown()
    ));
    leader.request_shutdown(team, member).await?;
    console.success(&format!("'{member}' approved and was stopped"));
    Ok(())
}

/// Fails with the first unresolved member's outcome when not everyone approved
pub async fn request_all(leader: &TeamLeader, console: &CliConsole, team: &str) -> Result<()> {
    let report = leader.request_shutdown_all(team).await?;
    console.emit_json(serde_json::to_value(&report)?);

    for member in &report.approved {
        console.success(&format!("'{member}' approved and was stopped"));
    }
    for member in &report.denied {
        console.warn(&format!("'{member}' denied the request"));
    }
    for member in &report.timed_out {
        console.warn(&format!("'{member}' did not answer in time"));
    }
    for (member, error) in &report.failed {
        console.error(&format!("'{member}': {error}"));
    }

    if let Some(member) = report.denied.first() {
        return Err(MusterError::ShutdownDenied {
            member: member.clone(),
            reason: None,
        }
        .into());
    }
    if let Some(member) = report.timed_out.first() {
        return Err(MusterError::TimedOut {
            member: member.clone(),
            waited: leader.config().timeouts.team_shutdown(),
        }
        .into());
    }
    if let Some((member, error)) = report.failed.first() {
        anyhow::bail!("shutdown of '{member}' failed: {error}");
    }
    Ok(())
}

pub async fn force(
    leader: &TeamLeader,
    console: &CliConsole,
    team: &str,
    member: &str,
) -> Result<()> {
    leader.force_shutdown(team, member).await?;
    console.warn(&format!("'{member}' was terminated without a handshake"));
    Ok(())
}

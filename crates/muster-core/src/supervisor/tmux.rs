//! Workers in dedicated tmux panes next to the leader

use super::{ExecutionBackend, LeaderContext, SpawnRequest};
use crate::config::BackendKind;
use crate::error::{MusterError, MusterResult};
use crate::team::ProcessHandle;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Opens one pane per worker in the leader's tmux session
#[derive(Debug, Clone)]
pub struct TmuxBackend {
    binary: String,
}

impl Default for TmuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxBackend {
    pub fn new() -> Self {
        Self {
            binary: "tmux".to_string(),
        }
    }

    /// Use a different tmux executable
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> MusterResult<std::process::Output> {
        debug!("Executing tmux command: {} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MusterError::PrerequisiteMissing(format!("'{}' is not installed", self.binary))
                } else {
                    e.into()
                }
            })
    }

    /// Session to place panes in: the leader's own, else the one we run inside
    fn target_session(leader: &LeaderContext) -> Option<String> {
        leader.session.clone().or_else(|| {
            std::env::var("TMUX")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|_| String::new())
        })
    }
}

/// The shell line a pane runs: `env K=V ... <command>`
pub(crate) fn pane_command(request: &SpawnRequest) -> String {
    let mut words = vec!["env".to_string()];
    words.extend(
        request
            .environment()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}")),
    );
    words.extend(request.command.iter().cloned());
    shell_words::join(words)
}

#[async_trait]
impl ExecutionBackend for TmuxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tmux
    }

    async fn check_prerequisites(&self, leader: &LeaderContext) -> MusterResult<()> {
        let output = self.run(&["-V"]).await?;
        if !output.status.success() {
            return Err(MusterError::PrerequisiteMissing(format!(
                "'{}' is not usable: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if Self::target_session(leader).is_none() {
            return Err(MusterError::PrerequisiteMissing(
                "no tmux session: run the leader inside tmux or set a leader session".to_string(),
            ));
        }
        Ok(())
    }

    async fn spawn(&self, request: &SpawnRequest) -> MusterResult<ProcessHandle> {
        if request.command.is_empty() {
            return Err(MusterError::PrerequisiteMissing("worker command is empty".to_string()));
        }

        let shell = pane_command(request);
        let mut args = vec!["split-window", "-d", "-P", "-F", "#{pane_id}"];
        let session = Self::target_session(&request.leader).unwrap_or_default();
        if !session.is_empty() {
            args.extend(["-t", session.as_str()]);
        }
        args.push(shell.as_str());

        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(MusterError::SpawnFailed {
                member: request.member.id.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pane_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if pane_id.is_empty() {
            return Err(MusterError::SpawnFailed {
                member: request.member.id.clone(),
                reason: "tmux did not report a pane id".to_string(),
            });
        }

        // Best effort: mirror pane output into the member's log
        let pipe = format!(
            "cat >> {}",
            shell_words::quote(&request.log_path.display().to_string())
        );
        match self.run(&["pipe-pane", "-t", &pane_id, &pipe]).await {
            Ok(out) if out.status.success() => {}
            Ok(out) => warn!(
                pane = %pane_id,
                "Could not pipe pane output: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!(pane = %pane_id, "Could not pipe pane output: {}", e),
        }

        info!(member = %request.member.id, pane = %pane_id, "worker pane opened");
        Ok(ProcessHandle::new(BackendKind::Tmux, pane_id))
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        match self
            .run(&["display-message", "-p", "-t", &handle.id, "#{pane_dead}"])
            .await
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim() != "1"
            }
            _ => false,
        }
    }

    async fn terminate(&self, handle: &ProcessHandle) -> MusterResult<()> {
        if !self.is_alive(handle).await {
            return Ok(());
        }
        let output = self.run(&["kill-pane", "-t", &handle.id]).await?;
        if !output.status.success() {
            // The pane may have closed between the check and the kill
            debug!(
                pane = %handle.id,
                "kill-pane failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        info!(pane = %handle.id, "worker pane closed");
        Ok(())
    }
}

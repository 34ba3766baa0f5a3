//! Process supervisor
//!
//! Starts and stops workers. Isolated members run behind an
//! [`ExecutionBackend`] (a tmux pane or a plain OS process); embedded members
//! run as tokio tasks inside the leader.

mod embedded;
mod process;
mod tmux;

pub use embedded::{EmbeddedRuntime, EmbeddedWorker};
pub use process::ProcessBackend;
pub use tmux::TmuxBackend;

use crate::config::{BackendKind, MusterConfig};
use crate::error::{MusterError, MusterResult};
use crate::team::{ExecutionMode, LEADER_ID, Member, ProcessHandle};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Leader identity handed to every worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderContext {
    /// OS process id of the leader
    pub process_id: String,
    /// Multiplexer session the leader runs in, if any
    pub session: Option<String>,
}

impl LeaderContext {
    pub fn current(session: Option<String>) -> Self {
        Self {
            process_id: std::process::id().to_string(),
            session,
        }
    }
}

/// Everything a backend needs to start one isolated worker
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub team: String,
    pub member: Member,
    pub leader: LeaderContext,
    /// Store root the worker must use
    pub home: PathBuf,
    /// Worker launcher argv
    pub command: Vec<String>,
    /// Where the worker's output goes when the backend captures it
    pub log_path: PathBuf,
}

impl SpawnRequest {
    /// Environment wired into the worker so it can find its team and mailbox
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("MUSTER_HOME".to_string(), self.home.display().to_string()),
            ("MUSTER_TEAM_NAME".to_string(), self.team.clone()),
            ("MUSTER_AGENT_ID".to_string(), self.member.id.clone()),
            ("MUSTER_AGENT_NAME".to_string(), self.member.name.clone()),
            ("MUSTER_AGENT_ROLE".to_string(), self.member.role_type.clone()),
            (
                "MUSTER_MODEL".to_string(),
                self.member.model_or_capability_class.clone(),
            ),
            ("MUSTER_LEADER_ID".to_string(), LEADER_ID.to_string()),
        ];
        if let Some(session) = &self.leader.session {
            env.push(("MUSTER_LEADER_SESSION".to_string(), session.clone()));
        }
        env
    }
}

/// Provider of isolated execution contexts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Fail with `PrerequisiteMissing` when no context can be created
    async fn check_prerequisites(&self, leader: &LeaderContext) -> MusterResult<()>;

    async fn spawn(&self, request: &SpawnRequest) -> MusterResult<ProcessHandle>;

    /// Never errors; a vanished context is simply not alive
    async fn is_alive(&self, handle: &ProcessHandle) -> bool;

    /// Idempotent
    async fn terminate(&self, handle: &ProcessHandle) -> MusterResult<()>;
}

/// Build the backend selected in configuration
pub fn backend_from_config(config: &MusterConfig) -> Arc<dyn ExecutionBackend> {
    match config.backend {
        BackendKind::Tmux => Arc::new(TmuxBackend::new()),
        BackendKind::Process => Arc::new(ProcessBackend::new(config.timeouts.terminate_grace())),
    }
}

/// Starts, probes and stops workers of every execution mode
pub struct ProcessSupervisor {
    backend: Arc<dyn ExecutionBackend>,
    embedded: EmbeddedRuntime,
    spawn_grace: Duration,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("backend", &self.backend.kind())
            .field("embedded", &self.embedded)
            .field("spawn_grace", &self.spawn_grace)
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        embedded: EmbeddedRuntime,
        spawn_grace: Duration,
    ) -> Self {
        Self {
            backend,
            embedded,
            spawn_grace,
        }
    }

    pub fn embedded(&self) -> &EmbeddedRuntime {
        &self.embedded
    }

    /// Pre-flight check, run before any registry or mailbox state exists
    pub async fn check_prerequisites(
        &self,
        mode: ExecutionMode,
        role_type: &str,
        leader: &LeaderContext,
    ) -> MusterResult<()> {
        match mode {
            ExecutionMode::Isolated => self.backend.check_prerequisites(leader).await,
            ExecutionMode::Embedded => {
                if self.embedded.has_template(role_type) {
                    Ok(())
                } else {
                    Err(MusterError::PrerequisiteMissing(format!(
                        "no embedded worker template registered for role '{role_type}'"
                    )))
                }
            }
        }
    }

    /// Start the worker and confirm it survives the grace period
    ///
    /// Returns the handle for isolated members, `None` for embedded ones.
    pub async fn spawn(&self, request: &SpawnRequest) -> MusterResult<Option<ProcessHandle>> {
        let member = &request.member;
        match member.execution_mode {
            ExecutionMode::Isolated => {
                let handle = self.backend.spawn(request).await?;
                debug!(member = %member.id, handle = %handle, "waiting out spawn grace period");
                tokio::time::sleep(self.spawn_grace).await;

                if !self.backend.is_alive(&handle).await {
                    if let Err(e) = self.backend.terminate(&handle).await {
                        warn!(handle = %handle, "Cleanup after failed spawn failed: {}", e);
                    }
                    return Err(MusterError::SpawnFailed {
                        member: member.id.clone(),
                        reason: format!("worker exited within {:?} of starting", self.spawn_grace),
                    });
                }

                info!(team = %request.team, member = %member.id, handle = %handle, "worker spawned");
                Ok(Some(handle))
            }
            ExecutionMode::Embedded => {
                self.embedded.start(&request.team, member)?;
                tokio::time::sleep(self.spawn_grace).await;

                if !self.embedded.is_alive(&request.team, &member.id) {
                    self.embedded.terminate(&request.team, &member.id).await;
                    return Err(MusterError::SpawnFailed {
                        member: member.id.clone(),
                        reason: "embedded worker finished during the grace period".to_string(),
                    });
                }

                info!(team = %request.team, member = %member.id, "embedded worker started");
                Ok(None)
            }
        }
    }

    /// Whether the member's execution context is still running
    pub async fn is_alive(&self, team: &str, member: &Member) -> bool {
        match member.execution_mode {
            ExecutionMode::Embedded => self.embedded.is_alive(team, &member.id),
            ExecutionMode::Isolated => match &member.process_handle {
                Some(handle) => self.backend.is_alive(handle).await,
                None => false,
            },
        }
    }

    /// Stop the member's execution context; safe to repeat
    pub async fn terminate(&self, team: &str, member: &Member) -> MusterResult<()> {
        match member.execution_mode {
            ExecutionMode::Embedded => {
                self.embedded.terminate(team, &member.id).await;
                Ok(())
            }
            ExecutionMode::Isolated => match &member.process_handle {
                Some(handle) => self.backend.terminate(handle).await,
                None => Ok(()),
            },
        }
    }
}

//! Workers as plain OS processes

use super::{ExecutionBackend, LeaderContext, SpawnRequest};
use crate::config::BackendKind;
use crate::error::{MusterError, MusterResult};
use crate::team::ProcessHandle;
use async_trait::async_trait;
use dashmap::DashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exit state of a child this backend started
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChildStatus {
    Running,
    Exited { exit_code: i32 },
    Failed { error: String },
    Killed,
}

impl std::fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited { exit_code } => write!(f, "exited with code {}", exit_code),
            Self::Failed { error } => write!(f, "failed: {}", error),
            Self::Killed => write!(f, "killed"),
        }
    }
}

struct TrackedChild {
    status: Arc<RwLock<ChildStatus>>,
    cancel: CancellationToken,
}

/// Spawns each worker as a child process with output appended to its log file
///
/// Children started by this backend are watched by a monitor task. Handles
/// inherited from an earlier leader run are probed by pid.
pub struct ProcessBackend {
    children: DashMap<String, TrackedChild>,
    terminate_grace: Duration,
}

impl std::fmt::Debug for ProcessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBackend")
            .field("tracked", &self.children.len())
            .field("terminate_grace", &self.terminate_grace)
            .finish()
    }
}

impl ProcessBackend {
    pub fn new(terminate_grace: Duration) -> Self {
        Self {
            children: DashMap::new(),
            terminate_grace,
        }
    }

    async fn monitor_process(
        mut child: Child,
        status: Arc<RwLock<ChildStatus>>,
        cancel: CancellationToken,
        pid: String,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    debug!("Kill of worker {} after cancellation: {}", pid, e);
                }
                *status.write().await = ChildStatus::Killed;
                debug!("Worker process {} was killed", pid);
            }
            result = child.wait() => {
                match result {
                    Ok(exit_status) => {
                        let exit_code = exit_status.code().unwrap_or(-1);
                        *status.write().await = ChildStatus::Exited { exit_code };
                        debug!("Worker process {} exited with code {}", pid, exit_code);
                    }
                    Err(e) => {
                        *status.write().await = ChildStatus::Failed { error: e.to_string() };
                        error!("Waiting on worker process {} failed: {}", pid, e);
                    }
                }
            }
        }
    }

    async fn tracked_running(&self, pid: &str) -> Option<bool> {
        let status = self.children.get(pid).map(|c| c.status.clone())?;
        let running = matches!(*status.read().await, ChildStatus::Running);
        Some(running)
    }
}

#[cfg(unix)]
fn pid_alive(pid: &str) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match pid.parse::<i32>() {
        Ok(raw) if raw > 0 => kill(Pid::from_raw(raw), None::<Signal>).is_ok(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn pid_alive(_pid: &str) -> bool {
    false
}

#[cfg(unix)]
fn send_signal(pid: &str, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = pid.parse::<i32>() else {
        return;
    };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {:?} to worker {}: {}", signal, pid, e),
    }
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn check_prerequisites(&self, _leader: &LeaderContext) -> MusterResult<()> {
        Ok(())
    }

    async fn spawn(&self, request: &SpawnRequest) -> MusterResult<ProcessHandle> {
        let member = &request.member.id;
        let (program, args) = request.command.split_first().ok_or_else(|| {
            MusterError::PrerequisiteMissing("worker command is empty".to_string())
        })?;

        if let Some(dir) = request.log_path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)
            .await?
            .into_std()
            .await;
        let stderr = stdout.try_clone()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(request.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MusterError::PrerequisiteMissing(format!("worker command '{program}' not found"))
            } else {
                MusterError::SpawnFailed {
                    member: member.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let pid = child
            .id()
            .ok_or_else(|| MusterError::SpawnFailed {
                member: member.clone(),
                reason: "process exited before reporting a pid".to_string(),
            })?
            .to_string();

        let status = Arc::new(RwLock::new(ChildStatus::Running));
        let cancel = CancellationToken::new();
        tokio::spawn(Self::monitor_process(
            child,
            status.clone(),
            cancel.clone(),
            pid.clone(),
        ));
        self.children
            .insert(pid.clone(), TrackedChild { status, cancel });

        info!(member = %member, pid = %pid, log = ?request.log_path, "worker process started");
        Ok(ProcessHandle::new(BackendKind::Process, pid))
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        match self.tracked_running(&handle.id).await {
            Some(running) => running,
            None => pid_alive(&handle.id),
        }
    }

    async fn terminate(&self, handle: &ProcessHandle) -> MusterResult<()> {
        let pid = handle.id.as_str();
        if !self.is_alive(handle).await {
            if let Some((_, child)) = self.children.remove(pid) {
                debug!("Worker {} already {}", pid, *child.status.read().await);
                child.cancel.cancel();
            }
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            send_signal(pid, Signal::SIGTERM);
            let deadline = tokio::time::Instant::now() + self.terminate_grace;
            while tokio::time::Instant::now() < deadline && self.is_alive(handle).await {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if self.is_alive(handle).await {
                debug!("Worker {} ignored SIGTERM, sending SIGKILL", pid);
                send_signal(pid, Signal::SIGKILL);
            }
        }

        // Tracked children are also reaped through their monitor
        if let Some((_, child)) = self.children.remove(pid) {
            child.cancel.cancel();
        }

        info!(pid = %pid, "worker process terminated");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::team::{ExecutionMode, Member};
    use chrono::Utc;
    use tempfile::TempDir;

    fn request(temp: &TempDir, command: &[&str]) -> SpawnRequest {
        SpawnRequest {
            team: "t1".to_string(),
            member: Member {
                id: "w1".to_string(),
                name: "w1".to_string(),
                role_type: "r".to_string(),
                model_or_capability_class: "default".to_string(),
                is_active: false,
                process_handle: None,
                execution_mode: ExecutionMode::Isolated,
                joined_at: Utc::now(),
                color: None,
                command: None,
            },
            leader: LeaderContext::current(None),
            home: temp.path().to_path_buf(),
            command: command.iter().map(|s| s.to_string()).collect(),
            log_path: temp.path().join("logs").join("w1.log"),
        }
    }

    #[tokio::test]
    async fn test_spawn_and_terminate() {
        let temp = TempDir::new().unwrap();
        let backend = ProcessBackend::new(Duration::from_millis(200));
        let handle = backend.spawn(&request(&temp, &["sleep", "30"])).await.unwrap();

        assert_eq!(handle.backend, BackendKind::Process);
        assert!(backend.is_alive(&handle).await);

        backend.terminate(&handle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!backend.is_alive(&handle).await);

        // Idempotent
        backend.terminate(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_output_goes_to_log_with_environment() {
        let temp = TempDir::new().unwrap();
        let backend = ProcessBackend::new(Duration::from_millis(200));
        let req = request(&temp, &["sh", "-c", "echo agent=$MUSTER_AGENT_ID"]);
        let handle = backend.spawn(&req).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!backend.is_alive(&handle).await);

        let log = std::fs::read_to_string(&req.log_path).unwrap();
        assert!(log.contains("agent=w1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_prerequisite() {
        let temp = TempDir::new().unwrap();
        let backend = ProcessBackend::new(Duration::from_millis(200));
        let err = backend
            .spawn(&request(&temp, &["/nonexistent/muster-worker-binary"]))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::PrerequisiteMissing(_)));
    }

    #[tokio::test]
    async fn test_vanished_handle_is_not_alive() {
        let backend = ProcessBackend::new(Duration::from_millis(200));
        let handle = ProcessHandle::new(BackendKind::Process, "not-a-pid");
        assert!(!backend.is_alive(&handle).await);
        backend.terminate(&handle).await.unwrap();
    }
}

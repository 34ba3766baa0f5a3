//! Shared fixtures for muster-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use muster_core::{
    BackendKind, EmbeddedWorker, ExecutionBackend, LeaderContext, MessageKind, MusterConfig,
    MusterError, MusterResult, ProcessHandle, SpawnRequest, TeamLeader, WorkerClient,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Role of an embedded worker that never answers anything
pub const SILENT_ROLE: &str = "silent";

/// Role of an embedded worker that refuses every shutdown request
pub const DENYING_ROLE: &str = "denier";

/// In-memory execution backend whose contexts can be killed on demand
#[derive(Default)]
pub struct FakeBackend {
    pub live: Mutex<HashSet<String>>,
    pub next_id: AtomicU32,
    pub missing_prerequisite: bool,
    pub exit_on_start: bool,
}

impl FakeBackend {
    /// Simulate the worker crashing behind the registry's back
    pub fn kill(&self, handle: &ProcessHandle) {
        self.live.lock().unwrap().remove(&handle.id);
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn check_prerequisites(&self, _leader: &LeaderContext) -> MusterResult<()> {
        if self.missing_prerequisite {
            Err(MusterError::PrerequisiteMissing("fake provider offline".into()))
        } else {
            Ok(())
        }
    }

    async fn spawn(&self, _request: &SpawnRequest) -> MusterResult<ProcessHandle> {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1000).to_string();
        if !self.exit_on_start {
            self.live.lock().unwrap().insert(id.clone());
        }
        Ok(ProcessHandle::new(BackendKind::Process, id))
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        self.live.lock().unwrap().contains(&handle.id)
    }

    async fn terminate(&self, handle: &ProcessHandle) -> MusterResult<()> {
        self.live.lock().unwrap().remove(&handle.id);
        Ok(())
    }
}

/// Waits for cancellation and ignores its mailbox
pub struct SilentWorker;

#[async_trait]
impl EmbeddedWorker for SilentWorker {
    async fn run(&self, _client: WorkerClient, cancel: CancellationToken) -> MusterResult<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

/// Answers every shutdown request with a refusal
pub struct DenyingWorker;

#[async_trait]
impl EmbeddedWorker for DenyingWorker {
    async fn run(&self, client: WorkerClient, cancel: CancellationToken) -> MusterResult<()> {
        loop {
            for entry in client.receive().await? {
                if entry.kind == MessageKind::ShutdownRequest {
                    let request_id = entry.request_id.clone().unwrap_or(entry.id.clone());
                    client
                        .respond_shutdown(&request_id, false, Some("still busy"))
                        .await?;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
    }
}

/// Fast timings rooted in a temporary directory
pub fn test_config(temp: &TempDir) -> MusterConfig {
    let mut config = MusterConfig::default();
    config.home_dir = Some(temp.path().to_path_buf());
    config.backend = BackendKind::Process;
    config.timeouts.shutdown_secs = 2;
    config.timeouts.team_shutdown_secs = 1;
    config.timeouts.spawn_grace_ms = 20;
    config.timeouts.poll_interval_ms = 20;
    config.timeouts.terminate_grace_ms = 50;
    config
}

/// Leader over a fake backend with the test templates registered
pub fn test_leader(temp: &TempDir, backend: Arc<FakeBackend>) -> TeamLeader {
    let leader = TeamLeader::with_backend(test_config(temp), backend).unwrap();
    leader.register_template(SILENT_ROLE, Arc::new(SilentWorker));
    leader.register_template(DENYING_ROLE, Arc::new(DenyingWorker));
    leader
}

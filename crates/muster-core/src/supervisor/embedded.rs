//! Embedded workers running as tokio tasks inside the leader

use crate::error::{MusterError, MusterResult};
use crate::team::Member;
use crate::worker::{WorkerClient, WorkerServices};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Behavioral template for a worker that runs inside the leader
///
/// Implementations talk to the team only through the [`WorkerClient`] and
/// must return once `cancel` fires.
#[async_trait]
pub trait EmbeddedWorker: Send + Sync {
    async fn run(&self, client: WorkerClient, cancel: CancellationToken) -> MusterResult<()>;
}

struct EmbeddedRun {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Templates by role type plus the set of running embedded workers
pub struct EmbeddedRuntime {
    services: WorkerServices,
    templates: DashMap<String, Arc<dyn EmbeddedWorker>>,
    runs: DashMap<String, EmbeddedRun>,
    stop_grace: Duration,
}

fn run_key(team: &str, member: &str) -> String {
    format!("{team}/{member}")
}

impl std::fmt::Debug for EmbeddedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let roles: Vec<String> = self.templates.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("EmbeddedRuntime")
            .field("templates", &roles)
            .field("running", &self.runs.len())
            .finish()
    }
}

impl EmbeddedRuntime {
    pub fn new(services: WorkerServices, stop_grace: Duration) -> Self {
        Self {
            services,
            templates: DashMap::new(),
            runs: DashMap::new(),
            stop_grace,
        }
    }

    /// Register the template used for members of `role_type`
    pub fn register(&self, role_type: impl Into<String>, worker: Arc<dyn EmbeddedWorker>) {
        let role_type = role_type.into();
        debug!(role = %role_type, "embedded template registered");
        self.templates.insert(role_type, worker);
    }

    pub fn has_template(&self, role_type: &str) -> bool {
        self.templates.contains_key(role_type)
    }

    /// Launch the member's template as a tokio task
    pub fn start(&self, team: &str, member: &Member) -> MusterResult<()> {
        let worker = self
            .templates
            .get(&member.role_type)
            .map(|t| t.value().clone())
            .ok_or_else(|| {
                MusterError::PrerequisiteMissing(format!(
                    "no embedded worker template registered for role '{}'",
                    member.role_type
                ))
            })?;

        let key = run_key(team, &member.id);
        if self.is_alive(team, &member.id) {
            return Err(MusterError::SpawnFailed {
                member: member.id.clone(),
                reason: "an embedded worker is already running for this member".to_string(),
            });
        }

        let client = self.services.client(team, &member.id)?;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            match worker.run(client, task_cancel).await {
                Ok(()) => debug!(worker = %task_key, "embedded worker finished"),
                Err(e) => warn!(worker = %task_key, "Embedded worker failed: {}", e),
            }
        });

        info!(worker = %key, role = %member.role_type, "embedded worker launched");
        self.runs.insert(key, EmbeddedRun { handle, cancel });
        Ok(())
    }

    /// Running means the task exists and has not finished
    pub fn is_alive(&self, team: &str, member: &str) -> bool {
        self.runs
            .get(&run_key(team, member))
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Cancel the worker, then abort it if it ignores cancellation
    pub async fn terminate(&self, team: &str, member: &str) {
        let Some((key, mut run)) = self.runs.remove(&run_key(team, member)) else {
            return;
        };

        run.cancel.cancel();
        if tokio::time::timeout(self.stop_grace, &mut run.handle)
            .await
            .is_err()
        {
            warn!(worker = %key, "Embedded worker ignored cancellation, aborting");
            run.handle.abort();
        }
        debug!(worker = %key, "embedded worker stopped");
    }

    /// Stop every embedded worker of a team
    pub async fn terminate_team(&self, team: &str) {
        let prefix = format!("{team}/");
        let members: Vec<String> = self
            .runs
            .iter()
            .filter_map(|e| e.key().strip_prefix(&prefix).map(str::to_string))
            .collect();
        for member in members {
            self.terminate(team, &member).await;
        }
    }
}

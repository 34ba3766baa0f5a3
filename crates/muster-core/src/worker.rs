//! Member-side API
//!
//! A worker (isolated process or embedded task) sees its team only through a
//! [`WorkerClient`]: it polls its own mailbox, answers shutdown requests,
//! reports idleness, and moves its own tasks through their lifecycle.

use crate::error::{MusterError, MusterResult};
use crate::mailbox::{MailboxEntry, MailboxStore, MessageKind, Messenger};
use crate::storage::{StoreLayout, validate_name};
use crate::supervisor::EmbeddedWorker;
use crate::tasks::{Task, TaskStatus, TaskStore, open_blockers};
use crate::team::{LEADER_ID, TeamRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The durable stores a worker needs, shared with the leader in-process
#[derive(Debug, Clone)]
pub struct WorkerServices {
    pub registry: Arc<TeamRegistry>,
    pub messenger: Messenger,
    pub tasks: Arc<TaskStore>,
    pub poll_interval: Duration,
}

impl WorkerServices {
    /// Open fresh store handles under `layout`
    pub fn open(layout: StoreLayout, poll_interval: Duration) -> Self {
        let registry = Arc::new(TeamRegistry::new(layout.clone()));
        let mailboxes = Arc::new(MailboxStore::new(layout.clone()));
        let messenger = Messenger::new(registry.clone(), mailboxes);
        let tasks = Arc::new(TaskStore::new(layout, registry.clone(), messenger.clone()));
        Self {
            registry,
            messenger,
            tasks,
            poll_interval,
        }
    }

    /// Handle for `member_id`; ids are checked so they cannot leave the layout
    pub fn client(&self, team: &str, member_id: &str) -> MusterResult<WorkerClient> {
        validate_name("Team", team)?;
        validate_name("Member", member_id)?;
        Ok(WorkerClient {
            team: team.to_string(),
            member_id: member_id.to_string(),
            services: self.clone(),
        })
    }
}

/// Identity wired into an isolated worker by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub home: PathBuf,
    pub team: String,
    pub member_id: String,
    pub name: Option<String>,
    pub role_type: Option<String>,
    pub model: Option<String>,
    pub leader_session: Option<String>,
}

impl WorkerIdentity {
    /// Read the identity from `MUSTER_*` variables
    pub fn from_env() -> MusterResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MusterResult<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| MusterError::Config(format!("{key} is not set")))
        };
        Ok(Self {
            home: PathBuf::from(required("MUSTER_HOME")?),
            team: required("MUSTER_TEAM_NAME")?,
            member_id: required("MUSTER_AGENT_ID")?,
            name: lookup("MUSTER_AGENT_NAME"),
            role_type: lookup("MUSTER_AGENT_ROLE"),
            model: lookup("MUSTER_MODEL"),
            leader_session: lookup("MUSTER_LEADER_SESSION"),
        })
    }
}

/// One member's handle on its team
#[derive(Debug, Clone)]
pub struct WorkerClient {
    team: String,
    member_id: String,
    services: WorkerServices,
}

impl WorkerClient {
    /// Client for an isolated worker, built from its wired environment
    pub fn from_env(poll_interval: Duration) -> MusterResult<Self> {
        let identity = WorkerIdentity::from_env()?;
        let services = WorkerServices::open(StoreLayout::new(identity.home), poll_interval);
        services.client(&identity.team, &identity.member_id)
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    fn mailboxes(&self) -> &MailboxStore {
        self.services.messenger.store()
    }

    /// Take every undelivered entry from the own mailbox
    pub async fn receive(&self) -> MusterResult<Vec<MailboxEntry>> {
        self.mailboxes().receive(&self.team, &self.member_id).await
    }

    /// Receive, waiting up to `timeout` for something to arrive
    pub async fn wait_for_messages(&self, timeout: Duration) -> MusterResult<Vec<MailboxEntry>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = self.mailboxes().notifier(&self.team, &self.member_id);
            let notified = notify.notified();

            let entries = self.receive().await?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let step = self.services.poll_interval.min(deadline - now);
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(step) => {}
            }
        }
    }

    /// Message the leader, a teammate, or `all`
    pub async fn send(
        &self,
        recipient: &str,
        body: &str,
        summary: Option<&str>,
    ) -> MusterResult<Vec<MailboxEntry>> {
        self.services
            .messenger
            .send(&self.team, &self.member_id, recipient, MessageKind::Message, body, summary)
            .await
    }

    /// Answer a shutdown request
    pub async fn respond_shutdown(
        &self,
        request_id: &str,
        approve: bool,
        reason: Option<&str>,
    ) -> MusterResult<MailboxEntry> {
        let entry = MailboxEntry::shutdown_response(&self.member_id, request_id, approve, reason);
        self.services
            .messenger
            .deliver(&self.team, LEADER_ID, &entry)
            .await?;
        info!(team = %self.team, member = %self.member_id, approve, "shutdown response sent");
        Ok(entry)
    }

    /// Tell the leader this member has nothing left to do
    pub async fn notify_idle(&self, body: &str) -> MusterResult<MailboxEntry> {
        let entry = MailboxEntry::idle_notification(&self.member_id, body);
        self.services
            .messenger
            .deliver(&self.team, LEADER_ID, &entry)
            .await?;
        debug!(team = %self.team, member = %self.member_id, "idle notification sent");
        Ok(entry)
    }

    /// Unfinished tasks owned by this member
    pub async fn my_tasks(&self) -> MusterResult<Vec<Task>> {
        self.services
            .tasks
            .open_tasks_for(&self.team, &self.member_id)
            .await
    }

    /// Owned tasks that are running or could start right now
    pub async fn actionable_tasks(&self) -> MusterResult<Vec<Task>> {
        let all = self.services.tasks.list_tasks(&self.team).await?;
        let graph: HashMap<String, Task> = all.iter().map(|t| (t.id.clone(), t.clone())).collect();
        Ok(all
            .into_iter()
            .filter(|t| t.owner.as_deref() == Some(self.member_id.as_str()))
            .filter(|t| match t.status {
                TaskStatus::InProgress => true,
                TaskStatus::Pending => open_blockers(t, &graph).is_empty(),
                _ => false,
            })
            .collect())
    }

    /// Move one of this member's own tasks
    pub async fn transition(&self, task_id: &str, next: TaskStatus) -> MusterResult<Task> {
        let task = self.services.tasks.resolve(&self.team, task_id).await?;
        if task.owner.as_deref() != Some(self.member_id.as_str()) {
            return Err(MusterError::InvalidInput(format!(
                "Task '{}' is not owned by '{}'",
                task.id, self.member_id
            )));
        }
        self.services
            .tasks
            .transition(&self.team, &task.id, next)
            .await
    }

    pub async fn start_task(&self, task_id: &str) -> MusterResult<Task> {
        self.transition(task_id, TaskStatus::InProgress).await
    }

    pub async fn complete_task(&self, task_id: &str) -> MusterResult<Task> {
        self.transition(task_id, TaskStatus::Completed).await
    }

    /// Park until the mailbox may have changed
    async fn park(&self) {
        self.mailboxes()
            .wait_for_append(&self.team, &self.member_id, self.services.poll_interval)
            .await;
    }
}

/// Built-in embedded template that follows the protocol and does no work
///
/// Approves every shutdown request and reports idle once whenever it holds no
/// actionable task.
#[derive(Debug, Default, Clone)]
pub struct CooperativeWorker;

pub const COOPERATIVE_ROLE: &str = "cooperative";

#[async_trait]
impl EmbeddedWorker for CooperativeWorker {
    async fn run(&self, client: WorkerClient, cancel: CancellationToken) -> MusterResult<()> {
        let mut idle_reported = false;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            for entry in client.receive().await? {
                match entry.kind {
                    MessageKind::ShutdownRequest => {
                        let request_id = entry.request_id.as_deref().unwrap_or(&entry.id);
                        client.respond_shutdown(request_id, true, None).await?;
                        return Ok(());
                    }
                    MessageKind::TaskAssignment => idle_reported = false,
                    _ => {}
                }
            }

            if !idle_reported && client.actionable_tasks().await?.is_empty() {
                client.notify_idle("No unblocked tasks remaining.").await?;
                idle_reported = true;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = client.park() => {}
            }
        }
    }
}

//! Leader-side facade
//!
//! [`TeamLeader`] composes the registry, mailboxes, task graph, supervisor,
//! liveness monitor and shutdown coordinator into the operations a
//! coordinating process issues.

use crate::config::MusterConfig;
use crate::error::MusterResult;
use crate::liveness::{Liveness, LivenessMonitor, MemberStatus};
use crate::mailbox::{MailboxEntry, MailboxStore, MessageKind, Messenger};
use crate::shutdown::{ShutdownCoordinator, TeamShutdownReport};
use crate::storage::StoreLayout;
use crate::supervisor::{
    EmbeddedRuntime, EmbeddedWorker, ExecutionBackend, LeaderContext, ProcessSupervisor,
    SpawnRequest, backend_from_config,
};
use crate::tasks::{NewTask, Task, TaskStatus, TaskStore};
use crate::team::{LEADER_ID, Member, MemberSpec, Team, TeamRegistry};
use crate::worker::{COOPERATIVE_ROLE, CooperativeWorker, WorkerServices};
use std::sync::Arc;
use tracing::{info, warn};

/// The coordinating side of every team it creates
#[derive(Debug)]
pub struct TeamLeader {
    config: MusterConfig,
    layout: StoreLayout,
    leader: LeaderContext,
    registry: Arc<TeamRegistry>,
    messenger: Messenger,
    tasks: Arc<TaskStore>,
    supervisor: Arc<ProcessSupervisor>,
    liveness: LivenessMonitor,
    shutdown: ShutdownCoordinator,
}

impl TeamLeader {
    /// Leader using the backend selected in `config`
    pub fn new(config: MusterConfig) -> MusterResult<Self> {
        let backend = backend_from_config(&config);
        Self::with_backend(config, backend)
    }

    /// Leader with an explicit execution backend
    pub fn with_backend(
        config: MusterConfig,
        backend: Arc<dyn ExecutionBackend>,
    ) -> MusterResult<Self> {
        config.validate()?;
        let layout = StoreLayout::new(config.resolve_home()?);
        let timeouts = &config.timeouts;

        let services = WorkerServices::open(layout.clone(), timeouts.poll_interval());
        let embedded = EmbeddedRuntime::new(services.clone(), timeouts.terminate_grace());
        embedded.register(COOPERATIVE_ROLE, Arc::new(CooperativeWorker));

        let supervisor = Arc::new(ProcessSupervisor::new(
            backend,
            embedded,
            timeouts.spawn_grace(),
        ));
        let WorkerServices {
            registry,
            messenger,
            tasks,
            ..
        } = services;

        let liveness = LivenessMonitor::new(
            registry.clone(),
            messenger.store().clone(),
            supervisor.clone(),
            config.liveness.clone(),
        );
        let shutdown = ShutdownCoordinator::new(
            registry.clone(),
            messenger.clone(),
            supervisor.clone(),
            timeouts.poll_interval(),
        );

        let session = std::env::var("MUSTER_LEADER_SESSION")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Self {
            config,
            layout,
            leader: LeaderContext::current(session),
            registry,
            messenger,
            tasks,
            supervisor,
            liveness,
            shutdown,
        })
    }

    /// Place panes in a specific multiplexer session
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.leader.session = Some(session.into());
        self
    }

    /// Make an embedded behavioral template available under `role_type`
    pub fn register_template(&self, role_type: &str, worker: Arc<dyn EmbeddedWorker>) {
        self.supervisor.embedded().register(role_type, worker);
    }

    pub fn config(&self) -> &MusterConfig {
        &self.config
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Arc<TeamRegistry> {
        &self.registry
    }

    pub fn mailboxes(&self) -> &Arc<MailboxStore> {
        self.messenger.store()
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Create a team and the leader's own mailbox
    pub async fn create_team(&self, name: &str, description: Option<&str>) -> MusterResult<Team> {
        let team = self
            .registry
            .create_team(
                name,
                description,
                &self.leader.process_id,
                self.leader.session.as_deref(),
            )
            .await?;
        self.mailboxes().init(name, LEADER_ID).await?;
        Ok(team)
    }

    pub async fn get_team(&self, name: &str) -> MusterResult<Team> {
        self.registry.get_team(name).await
    }

    pub async fn list_teams(&self) -> MusterResult<Vec<Team>> {
        self.registry.list_teams().await
    }

    /// Shut every member down, then purge the team
    ///
    /// With `force`, members that did not approve are terminated anyway.
    pub async fn delete_team(&self, name: &str, force: bool) -> MusterResult<TeamShutdownReport> {
        let report = self
            .shutdown
            .shutdown_team(name, Some("Team is being deleted."), self.config.timeouts.team_shutdown())
            .await?;

        if force {
            for member in report.unresolved() {
                self.shutdown.force_shutdown(name, &member).await?;
            }
        }

        self.registry.delete_team(name).await?;
        self.supervisor.embedded().terminate_team(name).await;
        self.shutdown.forget_team(name);
        Ok(report)
    }

    /// Register, spawn and activate a new member
    ///
    /// On any failure after registration the member record and its mailbox
    /// are removed again.
    pub async fn add_member(&self, team: &str, spec: &MemberSpec) -> MusterResult<Member> {
        self.registry.get_team(team).await?;
        self.supervisor
            .check_prerequisites(spec.execution_mode, &spec.role_type, &self.leader)
            .await?;

        let member = self.registry.add_member(team, spec).await?;
        match self.spawn_member(team, &member).await {
            Ok(active) => Ok(active),
            Err(e) => {
                warn!(team = %team, member = %member.id, "Spawn failed, rolling back: {}", e);
                self.rollback_member(team, &member.id).await;
                Err(e)
            }
        }
    }

    async fn spawn_member(&self, team: &str, member: &Member) -> MusterResult<Member> {
        self.mailboxes().init(team, &member.id).await?;

        let request = SpawnRequest {
            team: team.to_string(),
            member: member.clone(),
            leader: self.leader.clone(),
            home: self.layout.root().to_path_buf(),
            command: member
                .command
                .clone()
                .unwrap_or_else(|| self.config.worker_command.clone()),
            log_path: self.layout.worker_log(team, &member.id),
        };
        let handle = self.supervisor.spawn(&request).await?;

        match self
            .registry
            .activate_member(team, &member.id, handle.clone())
            .await
        {
            Ok(active) => {
                info!(team = %team, member = %active.id, mode = %active.execution_mode, "member joined");
                Ok(active)
            }
            Err(e) => {
                let spawned = Member {
                    process_handle: handle,
                    ..request.member
                };
                if let Err(stop) = self.supervisor.terminate(team, &spawned).await {
                    warn!(member = %spawned.id, "Failed to stop orphaned worker: {}", stop);
                }
                Err(e)
            }
        }
    }

    async fn rollback_member(&self, team: &str, member_id: &str) {
        if let Err(e) = self.registry.remove_member(team, member_id).await {
            warn!(team = %team, member = %member_id, "Rollback of member record failed: {}", e);
        }
        if let Err(e) = self.mailboxes().remove(team, member_id).await {
            warn!(team = %team, member = %member_id, "Rollback of mailbox failed: {}", e);
        }
    }

    /// Send from the leader or a member; `recipient = "all"` broadcasts
    pub async fn send_message(
        &self,
        team: &str,
        from: &str,
        recipient: &str,
        body: &str,
        summary: Option<&str>,
    ) -> MusterResult<Vec<MailboxEntry>> {
        self.messenger
            .send(team, from, recipient, MessageKind::Message, body, summary)
            .await
    }

    /// Entries the leader has not seen yet
    pub async fn receive(&self, team: &str) -> MusterResult<Vec<MailboxEntry>> {
        self.mailboxes().receive(team, LEADER_ID).await
    }

    pub async fn peek(&self, team: &str, mailbox: &str, n: usize) -> MusterResult<Vec<MailboxEntry>> {
        self.mailboxes().peek_recent(team, mailbox, n).await
    }

    pub async fn create_task(&self, team: &str, new: NewTask) -> MusterResult<Task> {
        self.tasks.create_task(team, new).await
    }

    pub async fn transition_task(
        &self,
        team: &str,
        task_id: &str,
        next: TaskStatus,
    ) -> MusterResult<Task> {
        self.tasks.transition(team, task_id, next).await
    }

    pub async fn assign_task(
        &self,
        team: &str,
        task_id: &str,
        owner: Option<&str>,
    ) -> MusterResult<Task> {
        self.tasks.assign(team, task_id, owner).await
    }

    pub async fn add_dependency(
        &self,
        team: &str,
        task_id: &str,
        blocker_id: &str,
    ) -> MusterResult<Task> {
        self.tasks.add_dependency(team, task_id, blocker_id).await
    }

    pub async fn remove_dependency(
        &self,
        team: &str,
        task_id: &str,
        blocker_id: &str,
    ) -> MusterResult<Task> {
        self.tasks.remove_dependency(team, task_id, blocker_id).await
    }

    pub async fn list_blockers(&self, team: &str, task_id: &str) -> MusterResult<Vec<Task>> {
        self.tasks.list_blockers(team, task_id).await
    }

    pub async fn list_tasks(&self, team: &str) -> MusterResult<Vec<Task>> {
        self.tasks.list_tasks(team).await
    }

    pub async fn status(&self, team: &str) -> MusterResult<Vec<MemberStatus>> {
        self.liveness.check_team(team).await
    }

    pub async fn member_status(&self, team: &str, member_id: &str) -> MusterResult<MemberStatus> {
        self.liveness.check_member(team, member_id).await
    }

    /// Deactivate every member whose execution context has vanished
    ///
    /// Returns the ids that were deactivated.
    pub async fn reconcile(&self, team: &str) -> MusterResult<Vec<String>> {
        let offline: Vec<String> = self
            .liveness
            .check_team(team)
            .await?
            .into_iter()
            .filter(|s| s.liveness == Liveness::Offline)
            .map(|s| s.member_id)
            .collect();

        let record = self.registry.get_team(team).await?;
        for id in &offline {
            if let Some(member) = record.member(id) {
                self.supervisor.terminate(team, member).await?;
            }
            self.registry.deactivate_member(team, id).await?;
            info!(team = %team, member = %id, "offline member deactivated");
        }
        Ok(offline)
    }

    /// Ask one member to shut down, waiting the single-member budget
    pub async fn request_shutdown(&self, team: &str, member_id: &str) -> MusterResult<()> {
        self.shutdown
            .request_shutdown(team, member_id, None, self.config.timeouts.shutdown())
            .await
    }

    /// Ask every active member to shut down concurrently
    pub async fn request_shutdown_all(&self, team: &str) -> MusterResult<TeamShutdownReport> {
        self.shutdown
            .shutdown_team(team, None, self.config.timeouts.team_shutdown())
            .await
    }

    pub async fn force_shutdown(&self, team: &str, member_id: &str) -> MusterResult<()> {
        self.shutdown.force_shutdown(team, member_id).await
    }
}

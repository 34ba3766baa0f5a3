//! File-backed task graph, one JSON record per task

use super::graph::{detect_cycle, open_blockers};
use super::{NewTask, Task, TaskStatus};
use crate::error::{MusterError, MusterResult};
use crate::locks::FileLocks;
use crate::mailbox::{MailboxEntry, MessageKind, Messenger};
use crate::storage::{StoreLayout, validate_name, write_json_atomic};
use crate::team::{LEADER_ID, Team, TeamRegistry};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Graph = HashMap<String, Task>;

/// Task graph store
///
/// Every mutation of a team's graph (creation, edge edits, transitions and
/// the completion fan-out) runs under that team's lock, shared by every
/// process opened on the same home.
#[derive(Debug)]
pub struct TaskStore {
    layout: StoreLayout,
    registry: Arc<TeamRegistry>,
    messenger: Messenger,
    locks: FileLocks,
}

impl TaskStore {
    pub fn new(layout: StoreLayout, registry: Arc<TeamRegistry>, messenger: Messenger) -> Self {
        let locks = FileLocks::new(layout.lock_dir("tasks"));
        Self {
            layout,
            registry,
            messenger,
            locks,
        }
    }

    /// Create a task, rejecting any edge set that would close a cycle
    pub async fn create_task(&self, team: &str, new: NewTask) -> MusterResult<Task> {
        let subject = new.subject.trim();
        if subject.is_empty() {
            return Err(MusterError::InvalidInput("Task subject cannot be empty".into()));
        }

        let record = self.registry.get_team(team).await?;
        if let Some(owner) = &new.owner {
            ensure_member(&record, owner)?;
        }

        let _guard = self.locks.lock(team).await?;
        let mut graph = self.load_graph(team).await?;

        let blocked_by: BTreeSet<String> = new.blocked_by.iter().cloned().collect();
        let blocks: BTreeSet<String> = new.blocks.iter().cloned().collect();
        for id in blocked_by.iter().chain(blocks.iter()) {
            if !graph.contains_key(id) {
                return Err(MusterError::task_not_found(id.clone()));
            }
        }
        for id in &blocks {
            ensure_can_gain_blocker(&graph[id])?;
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            team: team.to_string(),
            subject: subject.to_string(),
            description: new.description.clone(),
            owner: new.owner.clone(),
            status: TaskStatus::Pending,
            priority: new.priority,
            blocks: blocks.clone(),
            blocked_by: blocked_by.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut edges = dependency_map(&graph);
        edges.insert(task.id.clone(), blocked_by.clone());
        for id in &blocks {
            if let Some(deps) = edges.get_mut(id) {
                deps.insert(task.id.clone());
            }
        }
        if let Some(path) = detect_cycle(&edges) {
            return Err(MusterError::CycleDetected { path });
        }

        // blockedBy is authoritative, so the new record lands first
        self.save(&task).await?;
        for id in &blocks {
            if let Some(dependent) = graph.get_mut(id) {
                dependent.blocked_by.insert(task.id.clone());
                dependent.updated_at = now;
                self.save(dependent).await?;
            }
        }
        for id in &blocked_by {
            if let Some(blocker) = graph.get_mut(id) {
                blocker.blocks.insert(task.id.clone());
                self.save(blocker).await?;
            }
        }

        info!(team = %team, task = %task.id, subject = %task.subject, "task created");

        if let Some(owner) = &task.owner {
            self.notify_assignment(&task, owner).await?;
        }
        Ok(task)
    }

    /// Load one task
    pub async fn get_task(&self, team: &str, task_id: &str) -> MusterResult<Task> {
        let mut graph = self.load_graph(team).await?;
        graph
            .remove(task_id)
            .ok_or_else(|| MusterError::task_not_found(task_id))
    }

    /// All tasks of a team, oldest first
    pub async fn list_tasks(&self, team: &str) -> MusterResult<Vec<Task>> {
        let graph = self.load_graph(team).await?;
        let mut tasks: Vec<Task> = graph.into_values().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Tasks owned by `member` that are not yet finished
    pub async fn open_tasks_for(&self, team: &str, member: &str) -> MusterResult<Vec<Task>> {
        Ok(self
            .list_tasks(team)
            .await?
            .into_iter()
            .filter(|t| t.owner.as_deref() == Some(member) && !t.status.is_terminal())
            .collect())
    }

    /// Resolve a full id or a unique id prefix
    pub async fn resolve(&self, team: &str, id_or_prefix: &str) -> MusterResult<Task> {
        let mut graph = self.load_graph(team).await?;
        if let Some(task) = graph.remove(id_or_prefix) {
            return Ok(task);
        }

        let mut matches: Vec<Task> = graph
            .into_values()
            .filter(|t| !id_or_prefix.is_empty() && t.id.starts_with(id_or_prefix))
            .collect();
        match matches.len() {
            0 => Err(MusterError::task_not_found(id_or_prefix)),
            1 => Ok(matches.remove(0)),
            n => Err(MusterError::InvalidInput(format!(
                "Task prefix '{id_or_prefix}' is ambiguous ({n} matches)"
            ))),
        }
    }

    /// Immediate blocking set of a task
    pub async fn list_blockers(&self, team: &str, task_id: &str) -> MusterResult<Vec<Task>> {
        let graph = self.load_graph(team).await?;
        let task = graph
            .get(task_id)
            .ok_or_else(|| MusterError::task_not_found(task_id))?;
        Ok(task
            .blocked_by
            .iter()
            .filter_map(|id| graph.get(id).cloned())
            .collect())
    }

    /// Apply a status change through the transition table
    pub async fn transition(
        &self,
        team: &str,
        task_id: &str,
        next: TaskStatus,
    ) -> MusterResult<Task> {
        let _guard = self.locks.lock(team).await?;
        let graph = self.load_graph(team).await?;
        let mut task = graph
            .get(task_id)
            .cloned()
            .ok_or_else(|| MusterError::task_not_found(task_id))?;

        if task.status == next {
            debug!(task = %task_id, status = %next, "transition is a no-op");
            if next == TaskStatus::Completed {
                self.notify_dependents(&task, &graph).await;
            }
            return Ok(task);
        }

        if !task.status.can_transition_to(next) {
            return Err(MusterError::InvalidTransition {
                task: task_id.to_string(),
                from: task.status.to_string(),
                to: next.to_string(),
            });
        }

        if next == TaskStatus::InProgress {
            let open = open_blockers(&task, &graph);
            if !open.is_empty() {
                return Err(MusterError::StillBlocked {
                    task: task_id.to_string(),
                    blockers: open,
                });
            }
        }

        let from = task.status;
        task.status = next;
        task.updated_at = Utc::now();
        self.save(&task).await?;
        info!(team = %team, task = %task_id, from = %from, to = %next, "task transitioned");

        if next == TaskStatus::Completed {
            let mut graph = graph;
            graph.insert(task.id.clone(), task.clone());
            self.notify_dependents(&task, &graph).await;
        }
        Ok(task)
    }

    /// Make `task_id` wait on `blocker_id`
    pub async fn add_dependency(
        &self,
        team: &str,
        task_id: &str,
        blocker_id: &str,
    ) -> MusterResult<Task> {
        let _guard = self.locks.lock(team).await?;
        let mut graph = self.load_graph(team).await?;
        if !graph.contains_key(blocker_id) {
            return Err(MusterError::task_not_found(blocker_id));
        }
        let task = graph
            .get(task_id)
            .ok_or_else(|| MusterError::task_not_found(task_id))?;
        if task.blocked_by.contains(blocker_id) {
            return Ok(task.clone());
        }
        ensure_can_gain_blocker(task)?;

        let mut edges = dependency_map(&graph);
        if let Some(deps) = edges.get_mut(task_id) {
            deps.insert(blocker_id.to_string());
        }
        if let Some(path) = detect_cycle(&edges) {
            return Err(MusterError::CycleDetected { path });
        }

        let now = Utc::now();
        let mut task = graph
            .remove(task_id)
            .ok_or_else(|| MusterError::task_not_found(task_id))?;
        task.blocked_by.insert(blocker_id.to_string());
        task.updated_at = now;
        self.save(&task).await?;

        if let Some(blocker) = graph.get_mut(blocker_id) {
            blocker.blocks.insert(task_id.to_string());
            self.save(blocker).await?;
        }

        info!(team = %team, task = %task_id, blocker = %blocker_id, "dependency added");
        Ok(task)
    }

    /// Drop the edge `task_id` blocked-by `blocker_id`
    pub async fn remove_dependency(
        &self,
        team: &str,
        task_id: &str,
        blocker_id: &str,
    ) -> MusterResult<Task> {
        let _guard = self.locks.lock(team).await?;
        let mut graph = self.load_graph(team).await?;
        let mut task = graph
            .remove(task_id)
            .ok_or_else(|| MusterError::task_not_found(task_id))?;
        if !task.blocked_by.remove(blocker_id) {
            return Ok(task);
        }

        task.updated_at = Utc::now();
        self.save(&task).await?;
        if let Some(blocker) = graph.get_mut(blocker_id) {
            blocker.blocks.remove(task_id);
            self.save(blocker).await?;
        }

        info!(team = %team, task = %task_id, blocker = %blocker_id, "dependency removed");
        Ok(task)
    }

    /// Change the owner of an unfinished task
    pub async fn assign(
        &self,
        team: &str,
        task_id: &str,
        owner: Option<&str>,
    ) -> MusterResult<Task> {
        let record = self.registry.get_team(team).await?;
        if let Some(owner) = owner {
            ensure_member(&record, owner)?;
        }

        let _guard = self.locks.lock(team).await?;
        let mut task = self.get_task(team, task_id).await?;
        if task.status.is_terminal() {
            return Err(MusterError::InvalidInput(format!(
                "Task '{task_id}' is {} and cannot be reassigned",
                task.status
            )));
        }
        if task.owner.as_deref() == owner {
            return Ok(task);
        }

        task.owner = owner.map(str::to_string);
        task.updated_at = Utc::now();
        self.save(&task).await?;
        info!(team = %team, task = %task_id, owner = ?owner, "task assigned");

        if let Some(owner) = owner {
            self.notify_assignment(&task, owner).await?;
        }
        Ok(task)
    }

    async fn notify_assignment(&self, task: &Task, owner: &str) -> MusterResult<()> {
        let entry = MailboxEntry::new(
            LEADER_ID,
            MessageKind::TaskAssignment,
            format!("Task '{}' ({}) is assigned to you.", task.subject, task.id),
        )
        .with_summary(format!("assigned: {}", task.subject))
        .with_task(&task.id);
        self.messenger.deliver(&task.team, owner, &entry).await
    }

    /// Tell the owner of every dependent task that `completed` has finished
    ///
    /// A dependent without an owner is reported to whoever owns `completed`,
    /// or to the leader. Delivery failures are logged; the status change
    /// already stands and a repeated completion re-sends the notices.
    async fn notify_dependents(&self, completed: &Task, graph: &Graph) {
        let mut dependents: Vec<&Task> = graph
            .values()
            .filter(|t| t.blocked_by.contains(&completed.id))
            .collect();
        dependents.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let from = completed.owner.as_deref().unwrap_or(LEADER_ID);
        for dependent in dependents {
            let owner = dependent.owner.as_deref().unwrap_or(from);

            let remaining = open_blockers(dependent, graph);
            let mut body = format!(
                "Task '{}' ({}) is completed; '{}' ({}) no longer waits on it.",
                completed.subject, completed.id, dependent.subject, dependent.id
            );
            if remaining.is_empty() {
                body.push_str(" All blockers are cleared.");
            }
            let entry = MailboxEntry::new(from, MessageKind::Message, body)
                .with_summary(format!("unblocked by: {}", completed.subject))
                .with_task(&completed.id);

            if let Err(e) = self.messenger.deliver(&completed.team, owner, &entry).await {
                warn!(
                    team = %completed.team,
                    task = %dependent.id,
                    owner = %owner,
                    "Failed to deliver dependency notice: {}",
                    e
                );
            }
        }
    }

    async fn save(&self, task: &Task) -> MusterResult<()> {
        write_json_atomic(&self.layout.task_record(&task.team, &task.id), task).await
    }

    /// Read every record of a team and re-derive `blocks` from `blocked_by`
    async fn load_graph(&self, team: &str) -> MusterResult<Graph> {
        validate_name("Team", team)?;
        let dir = self.layout.task_dir(team);
        let mut graph = Graph::new();
        if !fs::try_exists(&dir).await? {
            if !fs::try_exists(self.layout.team_config(team)).await? {
                return Err(MusterError::team_not_found(team));
            }
            return Ok(graph);
        }

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Task>(&content) {
                Ok(task) => {
                    graph.insert(task.id.clone(), task);
                }
                Err(e) => warn!("Skipping unreadable task record {:?}: {}", path, e),
            }
        }

        let edges: Vec<(String, String)> = graph
            .values()
            .flat_map(|t| t.blocked_by.iter().map(|b| (b.clone(), t.id.clone())))
            .collect();
        for task in graph.values_mut() {
            task.blocks.clear();
        }
        for (blocker, dependent) in edges {
            if let Some(task) = graph.get_mut(&blocker) {
                task.blocks.insert(dependent);
            }
        }

        Ok(graph)
    }
}

fn dependency_map(graph: &Graph) -> BTreeMap<String, BTreeSet<String>> {
    graph
        .values()
        .map(|t| (t.id.clone(), t.blocked_by.clone()))
        .collect()
}

fn ensure_member(team: &Team, member: &str) -> MusterResult<()> {
    if team.member(member).is_some() {
        Ok(())
    } else {
        Err(MusterError::member_not_found(&team.name, member))
    }
}

fn ensure_can_gain_blocker(task: &Task) -> MusterResult<()> {
    if task.status == TaskStatus::Pending {
        Ok(())
    } else {
        Err(MusterError::InvalidInput(format!(
            "Task '{}' is {} and cannot gain blockers",
            task.id, task.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MailboxStore;
    use crate::team::MemberSpec;
    use tempfile::TempDir;

    struct Fixture {
        tasks: TaskStore,
        mailboxes: Arc<MailboxStore>,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let registry = Arc::new(TeamRegistry::new(layout.clone()));
        let mailboxes = Arc::new(MailboxStore::new(layout.clone()));
        let messenger = Messenger::new(registry.clone(), mailboxes.clone());

        registry.create_team("t1", None, "leader", None).await.unwrap();
        mailboxes.init("t1", LEADER_ID).await.unwrap();
        for name in ["w1", "w2"] {
            registry
                .add_member("t1", &MemberSpec::new(name, "r").embedded())
                .await
                .unwrap();
            mailboxes.init("t1", name).await.unwrap();
        }

        Fixture {
            tasks: TaskStore::new(layout, registry, messenger),
            mailboxes,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn test_create_derives_inverse_edges() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let b = f
            .tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();

        let a = f.tasks.get_task("t1", &a.id).await.unwrap();
        assert!(a.blocks.contains(&b.id));
        assert!(b.blocked_by.contains(&a.id));
        assert_eq!(b.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_blocks_rederived_from_blocked_by() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let b = f
            .tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();

        // Simulate a crash between the two record writes
        let mut stale = f.tasks.get_task("t1", &a.id).await.unwrap();
        stale.blocks.clear();
        f.tasks.save(&stale).await.unwrap();

        let a = f.tasks.get_task("t1", &a.id).await.unwrap();
        assert!(a.blocks.contains(&b.id));
    }

    #[tokio::test]
    async fn test_unknown_references() {
        let f = fixture().await;
        let err = f
            .tasks
            .create_task("t1", NewTask::new("x").blocked_by(["nope"]))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::NotFound { kind: "Task", .. }));

        let err = f
            .tasks
            .create_task("t1", NewTask::new("x").owner("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::NotFound { kind: "Member", .. }));

        let err = f.tasks.list_tasks("missing").await.unwrap_err();
        assert!(matches!(err, MusterError::NotFound { kind: "Team", .. }));
        assert!(f.tasks.list_tasks("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_blocks_detects_cycle() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let b = f
            .tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();

        // c would be blocked by b and block a: a -> b -> c -> a
        let err = f
            .tasks
            .create_task(
                "t1",
                NewTask::new("c").blocked_by([b.id.clone()]).blocks([a.id.clone()]),
            )
            .await
            .unwrap_err();
        let MusterError::CycleDetected { path } = err else {
            panic!("expected cycle");
        };
        assert_eq!(path.first(), path.last());
        assert_eq!(f.tasks.list_tasks("t1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_dependency_cycle_leaves_graph_unchanged() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let b = f
            .tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();
        let before = f.tasks.list_tasks("t1").await.unwrap();

        let err = f.tasks.add_dependency("t1", &a.id, &b.id).await.unwrap_err();
        assert!(matches!(err, MusterError::CycleDetected { .. }));
        assert_eq!(f.tasks.list_tasks("t1").await.unwrap(), before);

        let err = f.tasks.add_dependency("t1", &a.id, &a.id).await.unwrap_err();
        assert!(matches!(err, MusterError::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn test_remove_dependency_unblocks() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let b = f
            .tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();

        f.tasks.remove_dependency("t1", &b.id, &a.id).await.unwrap();
        let started = f
            .tasks
            .transition("t1", &b.id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(f.tasks.get_task("t1", &a.id).await.unwrap().blocks.is_empty());
    }

    #[tokio::test]
    async fn test_transition_rules() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();

        let err = f
            .tasks
            .transition("t1", &a.id, TaskStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::InvalidTransition { .. }));

        let same = f.tasks.transition("t1", &a.id, TaskStatus::Pending).await.unwrap();
        assert_eq!(same.status, TaskStatus::Pending);

        f.tasks.transition("t1", &a.id, TaskStatus::Cancelled).await.unwrap();
        let err = f
            .tasks
            .transition("t1", &a.id, TaskStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_blocker_keeps_dependent_blocked() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let b = f
            .tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();
        f.tasks.transition("t1", &a.id, TaskStatus::Cancelled).await.unwrap();

        let err = f
            .tasks
            .transition("t1", &b.id, TaskStatus::InProgress)
            .await
            .unwrap_err();
        let MusterError::StillBlocked { blockers, .. } = err else {
            panic!("expected StillBlocked");
        };
        assert_eq!(blockers, vec![a.id]);
    }

    #[tokio::test]
    async fn test_assignment_notifies_owner() {
        let f = fixture().await;
        let task = f
            .tasks
            .create_task("t1", NewTask::new("lint").owner("w1"))
            .await
            .unwrap();

        let inbox = f.mailboxes.read_all("t1", "w1").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, MessageKind::TaskAssignment);
        assert_eq!(inbox[0].task_id.as_deref(), Some(task.id.as_str()));

        f.tasks.assign("t1", &task.id, Some("w2")).await.unwrap();
        let inbox = f.mailboxes.read_all("t1", "w2").await.unwrap();
        assert_eq!(inbox.len(), 1);

        // Same owner again sends nothing
        f.tasks.assign("t1", &task.id, Some("w2")).await.unwrap();
        assert_eq!(f.mailboxes.len("t1", "w2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recompletion_resends_notice() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        f.tasks
            .create_task("t1", NewTask::new("b").owner("w2").blocked_by([a.id.clone()]))
            .await
            .unwrap();

        f.tasks.transition("t1", &a.id, TaskStatus::InProgress).await.unwrap();
        f.tasks.transition("t1", &a.id, TaskStatus::Completed).await.unwrap();
        f.tasks.transition("t1", &a.id, TaskStatus::Completed).await.unwrap();

        let notices: Vec<_> = f
            .mailboxes
            .read_all("t1", "w2")
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == MessageKind::Message)
            .collect();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|e| e.task_id.as_deref() == Some(a.id.as_str())));
    }

    #[tokio::test]
    async fn test_unowned_dependent_reports_to_blocker_owner() {
        let f = fixture().await;
        let a = f
            .tasks
            .create_task("t1", NewTask::new("a").owner("w1"))
            .await
            .unwrap();
        f.tasks
            .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
            .await
            .unwrap();
        let c = f.tasks.create_task("t1", NewTask::new("c")).await.unwrap();
        f.tasks
            .create_task("t1", NewTask::new("d").blocked_by([c.id.clone()]))
            .await
            .unwrap();

        for id in [&a.id, &c.id] {
            f.tasks.transition("t1", id, TaskStatus::InProgress).await.unwrap();
            f.tasks.transition("t1", id, TaskStatus::Completed).await.unwrap();
        }

        let w1_notices: Vec<_> = f
            .mailboxes
            .read_all("t1", "w1")
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == MessageKind::Message)
            .collect();
        assert_eq!(w1_notices.len(), 1);
        assert_eq!(w1_notices[0].task_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(w1_notices[0].from, "w1");

        // Neither task has an owner, so the leader hears about it
        let leader_notices = f.mailboxes.read_all("t1", LEADER_ID).await.unwrap();
        assert_eq!(leader_notices.len(), 1);
        assert_eq!(leader_notices[0].task_id.as_deref(), Some(c.id.as_str()));
    }

    #[tokio::test]
    async fn test_cycle_check_holds_across_store_instances() {
        let f = fixture().await;
        let layout = StoreLayout::new(f._temp.path());
        let registry = Arc::new(TeamRegistry::new(layout.clone()));
        let mailboxes = Arc::new(MailboxStore::new(layout.clone()));
        let messenger = Messenger::new(registry.clone(), mailboxes);
        let other = TaskStore::new(layout, registry, messenger);

        for _ in 0..10 {
            let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
            let b = other.create_task("t1", NewTask::new("b")).await.unwrap();

            let (left, right) = tokio::join!(
                f.tasks.add_dependency("t1", &a.id, &b.id),
                other.add_dependency("t1", &b.id, &a.id),
            );
            let cycles = [&left, &right]
                .into_iter()
                .filter(|r| matches!(r, Err(MusterError::CycleDetected { .. })))
                .count();
            assert_eq!(cycles, 1, "{left:?} / {right:?}");
            assert!(left.is_ok() || right.is_ok());
        }
    }

    #[tokio::test]
    async fn test_resolve_prefix() {
        let f = fixture().await;
        let a = f.tasks.create_task("t1", NewTask::new("a")).await.unwrap();
        let found = f.tasks.resolve("t1", &a.id[..8]).await.unwrap();
        assert_eq!(found.id, a.id);

        let err = f.tasks.resolve("t1", "zzzz").await.unwrap_err();
        assert!(matches!(err, MusterError::NotFound { .. }));
    }
}

//! Team registry
//!
//! The authoritative record of every team, its members, and each member's
//! process handle and activity flag. Every mutation is a load-modify-store of
//! the team descriptor under the team's lock, which is held across processes.

mod types;

pub use types::{
    BROADCAST_RECIPIENT, ExecutionMode, LEADER_ID, Member, MemberSpec, ProcessHandle, Team,
    member_color, member_id_from_name,
};

use crate::error::{MusterError, MusterResult};
use crate::locks::FileLocks;
use crate::storage::{StoreLayout, remove_dir_if_exists, validate_name, write_json_atomic};
use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Registry of teams backed by one JSON descriptor per team
#[derive(Debug)]
pub struct TeamRegistry {
    layout: StoreLayout,
    locks: FileLocks,
}

impl TeamRegistry {
    pub fn new(layout: StoreLayout) -> Self {
        let locks = FileLocks::new(layout.lock_dir("registry"));
        Self { layout, locks }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Create a new team
    pub async fn create_team(
        &self,
        name: &str,
        description: Option<&str>,
        leader_process_id: &str,
        leader_session: Option<&str>,
    ) -> MusterResult<Team> {
        validate_name("Team", name)?;
        let _guard = self.locks.lock(name).await?;

        let config_path = self.layout.team_config(name);
        if fs::try_exists(&config_path).await? {
            return Err(MusterError::AlreadyExists(name.to_string()));
        }

        fs::create_dir_all(self.layout.inbox_dir(name)).await?;
        fs::create_dir_all(self.layout.task_dir(name)).await?;

        let now = Utc::now();
        let team = Team {
            name: name.to_string(),
            description: description.map(str::to_string),
            leader_process_id: leader_process_id.to_string(),
            leader_session: leader_session.map(str::to_string),
            created_at: now,
            updated_at: now,
            members: Vec::new(),
        };
        write_json_atomic(&config_path, &team).await?;

        info!(team = %name, leader = %leader_process_id, "team created");
        Ok(team)
    }

    /// Load a team descriptor
    pub async fn get_team(&self, name: &str) -> MusterResult<Team> {
        validate_name("Team", name)?;
        let path = self.layout.team_config(name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MusterError::team_not_found(name));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Discover every team with a readable descriptor
    pub async fn list_teams(&self) -> MusterResult<Vec<Team>> {
        let mut teams = Vec::new();
        let teams_dir = self.layout.teams_dir();
        if !fs::try_exists(&teams_dir).await? {
            return Ok(teams);
        }

        let mut entries = fs::read_dir(&teams_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join("config.json");
            if !fs::try_exists(&path).await? {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<Team>(&content) {
                    Ok(team) => teams.push(team),
                    Err(e) => warn!("Skipping unreadable team descriptor {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to read team descriptor {:?}: {}", path, e),
            }
        }

        teams.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(teams)
    }

    /// Register a new member, inactive until its spawn is recorded
    pub async fn add_member(&self, team: &str, spec: &MemberSpec) -> MusterResult<Member> {
        let id = spec.member_id()?;
        if let Some(argv) = &spec.command {
            if argv.is_empty() {
                return Err(MusterError::InvalidInput(
                    "Member command override cannot be empty".to_string(),
                ));
            }
        }

        self.mutate(team, |t| {
            if t.member(&id).is_some() {
                return Err(MusterError::DuplicateMember {
                    team: t.name.clone(),
                    member: id.clone(),
                });
            }
            let member = Member {
                id: id.clone(),
                name: spec.name.trim().to_string(),
                role_type: spec.role_type.clone(),
                model_or_capability_class: spec.model_or_capability_class.clone(),
                is_active: false,
                process_handle: None,
                execution_mode: spec.execution_mode,
                joined_at: Utc::now(),
                color: Some(member_color(t.members.len())),
                command: spec.command.clone(),
            };
            t.members.push(member.clone());
            Ok(member)
        })
        .await
    }

    /// Record a successful spawn
    pub async fn activate_member(
        &self,
        team: &str,
        member_id: &str,
        handle: Option<ProcessHandle>,
    ) -> MusterResult<Member> {
        self.mutate(team, |t| {
            let team_name = t.name.clone();
            let member = t
                .member_mut(member_id)
                .ok_or_else(|| MusterError::member_not_found(&team_name, member_id))?;

            let needs_handle = member.execution_mode == ExecutionMode::Isolated;
            if needs_handle != handle.is_some() {
                return Err(MusterError::InvalidInput(format!(
                    "{} member '{}' {} a process handle",
                    member.execution_mode,
                    member_id,
                    if needs_handle { "requires" } else { "cannot carry" }
                )));
            }

            member.is_active = true;
            member.process_handle = handle.clone();
            Ok(member.clone())
        })
        .await
    }

    /// Mark a member inactive and clear its handle
    ///
    /// This does not stop the process; callers pair it with the supervisor.
    pub async fn deactivate_member(&self, team: &str, member_id: &str) -> MusterResult<Member> {
        self.mutate(team, |t| {
            let team_name = t.name.clone();
            let member = t
                .member_mut(member_id)
                .ok_or_else(|| MusterError::member_not_found(&team_name, member_id))?;
            member.is_active = false;
            member.process_handle = None;
            Ok(member.clone())
        })
        .await
    }

    /// Drop a member record entirely; only used to roll back a failed spawn
    pub async fn remove_member(&self, team: &str, member_id: &str) -> MusterResult<()> {
        self.mutate(team, |t| {
            let before = t.members.len();
            t.members.retain(|m| m.id != member_id);
            if t.members.len() == before {
                return Err(MusterError::member_not_found(&t.name, member_id));
            }
            Ok(())
        })
        .await
    }

    /// Delete a team and purge its mailboxes and tasks
    pub async fn delete_team(&self, name: &str) -> MusterResult<()> {
        validate_name("Team", name)?;
        let guard = self.locks.lock(name).await?;

        let team = self.get_team(name).await?;
        let active = team.active_member_ids();
        if !active.is_empty() {
            return Err(MusterError::MembersStillActive {
                team: name.to_string(),
                active,
            });
        }

        // Descriptor first, so a crash mid-purge leaves no half-alive team
        fs::remove_file(self.layout.team_config(name)).await?;
        remove_dir_if_exists(&self.layout.team_dir(name)).await?;
        remove_dir_if_exists(&self.layout.task_dir(name)).await?;

        drop(guard);
        self.locks.forget(name);
        info!(team = %name, "team deleted");
        Ok(())
    }

    async fn mutate<T>(
        &self,
        team: &str,
        apply: impl FnOnce(&mut Team) -> MusterResult<T>,
    ) -> MusterResult<T> {
        validate_name("Team", team)?;
        let _guard = self.locks.lock(team).await?;

        let mut record = self.get_team(team).await?;
        let result = apply(&mut record)?;
        record.updated_at = Utc::now();
        write_json_atomic(&self.layout.team_config(team), &record).await?;

        debug!(team = %team, "team descriptor updated");
        Ok(result)
    }
}

//! Liveness classification
//!
//! Advisory only: checks read the registry, the supervisor and mailbox
//! timestamps, and never write anything back.

use crate::config::LivenessConfig;
use crate::error::MusterResult;
use crate::mailbox::MailboxStore;
use crate::supervisor::ProcessSupervisor;
use crate::team::{Member, ProcessHandle, TeamRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Observed state of one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// Running and recently active
    Active,
    /// Running, quiet for a while
    Idle,
    /// Running, quiet for a long time
    Stale,
    /// Registry says active but the execution context is gone
    Offline,
    /// Registry says inactive
    Inactive,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Liveness::Active => "active",
            Liveness::Idle => "idle",
            Liveness::Stale => "stale",
            Liveness::Offline => "offline",
            Liveness::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

/// Classify from raw observations
pub fn classify(
    registered_active: bool,
    alive: bool,
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    thresholds: &LivenessConfig,
) -> Liveness {
    if !registered_active {
        return Liveness::Inactive;
    }
    if !alive {
        return Liveness::Offline;
    }

    let quiet = (now - last_activity).num_seconds().max(0) as u64;
    if quiet < thresholds.active_secs {
        Liveness::Active
    } else if quiet <= thresholds.idle_secs {
        Liveness::Idle
    } else {
        Liveness::Stale
    }
}

/// Liveness report for one member
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub member_id: String,
    pub name: String,
    pub role_type: String,
    pub liveness: Liveness,
    /// Newest authored entry, or the join time when the member never wrote
    pub last_activity: DateTime<Utc>,
    pub process_handle: Option<ProcessHandle>,
}

/// Computes liveness for team members
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    registry: Arc<TeamRegistry>,
    mailboxes: Arc<MailboxStore>,
    supervisor: Arc<ProcessSupervisor>,
    thresholds: LivenessConfig,
}

impl LivenessMonitor {
    pub fn new(
        registry: Arc<TeamRegistry>,
        mailboxes: Arc<MailboxStore>,
        supervisor: Arc<ProcessSupervisor>,
        thresholds: LivenessConfig,
    ) -> Self {
        Self {
            registry,
            mailboxes,
            supervisor,
            thresholds,
        }
    }

    /// Status of one member
    pub async fn check_member(&self, team: &str, member_id: &str) -> MusterResult<MemberStatus> {
        let record = self.registry.get_team(team).await?;
        let member = record
            .member(member_id)
            .ok_or_else(|| crate::error::MusterError::member_not_found(team, member_id))?;
        self.status_of(team, member).await
    }

    /// Status of every member, in registration order
    pub async fn check_team(&self, team: &str) -> MusterResult<Vec<MemberStatus>> {
        let record = self.registry.get_team(team).await?;
        let mut report = Vec::with_capacity(record.members.len());
        for member in &record.members {
            report.push(self.status_of(team, member).await?);
        }
        Ok(report)
    }

    async fn status_of(&self, team: &str, member: &Member) -> MusterResult<MemberStatus> {
        let alive = member.is_active && self.supervisor.is_alive(team, member).await;
        let last_activity = self
            .mailboxes
            .last_activity(team, &member.id)
            .await?
            .unwrap_or(member.joined_at);

        let liveness = classify(
            member.is_active,
            alive,
            last_activity,
            Utc::now(),
            &self.thresholds,
        );
        if liveness == Liveness::Offline {
            warn!(
                team = %team,
                member = %member.id,
                handle = ?member.process_handle,
                "member is registered active but its execution context is gone"
            );
        }

        Ok(MemberStatus {
            member_id: member.id.clone(),
            name: member.name.clone(),
            role_type: member.role_type.clone(),
            liveness,
            last_activity,
            process_handle: member.process_handle.clone(),
        })
    }
}

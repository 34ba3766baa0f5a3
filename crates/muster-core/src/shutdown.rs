//! Cooperative shutdown protocol
//!
//! `Requested -> {Approved, Denied, TimedOut}`. Only an approval leads to
//! termination and deactivation; the forced path skips the handshake.

use crate::error::{MusterError, MusterResult};
use crate::mailbox::{MailboxEntry, MailboxStore, Messenger};
use crate::supervisor::ProcessSupervisor;
use crate::team::{LEADER_ID, Member, TeamRegistry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a member's latest shutdown attempt stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ShutdownState {
    Requested { request_id: String },
    Approved,
    Denied { reason: Option<String> },
    TimedOut,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownState::Requested { .. } => write!(f, "requested"),
            ShutdownState::Approved => write!(f, "approved"),
            ShutdownState::Denied { .. } => write!(f, "denied"),
            ShutdownState::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Per-member result of a team-wide shutdown
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamShutdownReport {
    pub approved: Vec<String>,
    pub denied: Vec<String>,
    pub timed_out: Vec<String>,
    /// Members whose request could not be carried out, with the error
    pub failed: Vec<(String, String)>,
}

impl TeamShutdownReport {
    /// Members that are still running after the attempt
    pub fn unresolved(&self) -> Vec<String> {
        self.denied
            .iter()
            .chain(self.timed_out.iter())
            .chain(self.failed.iter().map(|(m, _)| m))
            .cloned()
            .collect()
    }

    pub fn all_approved(&self) -> bool {
        self.unresolved().is_empty()
    }
}

fn state_key(team: &str, member: &str) -> String {
    format!("{team}/{member}")
}

/// Holds a member's `Requested` slot until an outcome is recorded
///
/// Dropping it unsettled (the request future was cancelled) clears the slot,
/// so the member does not stay pending forever.
struct PendingRequest<'a> {
    states: &'a DashMap<String, ShutdownState>,
    key: String,
    request_id: String,
    settled: bool,
}

impl PendingRequest<'_> {
    fn settle(mut self, state: Option<ShutdownState>) {
        self.settled = true;
        match state {
            Some(state) => {
                self.states.insert(self.key.clone(), state);
            }
            None => {
                self.states.remove(&self.key);
            }
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let abandoned = self.states.remove_if(&self.key, |_, state| {
            matches!(state, ShutdownState::Requested { request_id } if *request_id == self.request_id)
        });
        if abandoned.is_some() {
            debug!(
                member = %self.key,
                request = %self.request_id,
                "abandoned shutdown request cleared"
            );
        }
    }
}

/// Runs the shutdown handshake and applies its outcome
#[derive(Debug)]
pub struct ShutdownCoordinator {
    registry: Arc<TeamRegistry>,
    messenger: Messenger,
    supervisor: Arc<ProcessSupervisor>,
    states: DashMap<String, ShutdownState>,
    poll_interval: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        registry: Arc<TeamRegistry>,
        messenger: Messenger,
        supervisor: Arc<ProcessSupervisor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            messenger,
            supervisor,
            states: DashMap::new(),
            poll_interval,
        }
    }

    fn mailboxes(&self) -> &MailboxStore {
        self.messenger.store()
    }

    /// Latest recorded state for a member, if any request was made
    pub fn state(&self, team: &str, member: &str) -> Option<ShutdownState> {
        self.states.get(&state_key(team, member)).map(|s| s.clone())
    }

    /// Ask one member to shut down and wait up to `timeout` for its answer
    ///
    /// Approval terminates the worker and deactivates it. Denial and timeout
    /// leave the member active and surface as errors.
    pub async fn request_shutdown(
        &self,
        team: &str,
        member_id: &str,
        reason: Option<&str>,
        timeout: Duration,
    ) -> MusterResult<()> {
        let record = self.registry.get_team(team).await?;
        let member = record
            .member(member_id)
            .cloned()
            .ok_or_else(|| MusterError::member_not_found(team, member_id))?;
        if !member.is_active {
            return Err(MusterError::InvalidInput(format!(
                "Member '{member_id}' is not active"
            )));
        }

        let key = state_key(team, member_id);
        let request = MailboxEntry::shutdown_request(LEADER_ID, reason);
        let request_id = request.request_id.clone().unwrap_or_else(|| request.id.clone());
        {
            let mut slot = self.states.entry(key.clone()).or_insert(ShutdownState::TimedOut);
            if matches!(*slot, ShutdownState::Requested { .. }) {
                return Err(MusterError::ShutdownPending(member_id.to_string()));
            }
            *slot = ShutdownState::Requested {
                request_id: request_id.clone(),
            };
        }
        let pending = PendingRequest {
            states: &self.states,
            key,
            request_id: request_id.clone(),
            settled: false,
        };

        let outcome = self
            .handshake(team, &member, &request, &request_id, timeout)
            .await;

        let state = match &outcome {
            Ok(()) => Some(ShutdownState::Approved),
            Err(MusterError::ShutdownDenied { reason, .. }) => Some(ShutdownState::Denied {
                reason: reason.clone(),
            }),
            Err(MusterError::TimedOut { .. }) => Some(ShutdownState::TimedOut),
            Err(_) => None,
        };
        pending.settle(state);
        outcome
    }

    async fn handshake(
        &self,
        team: &str,
        member: &Member,
        request: &MailboxEntry,
        request_id: &str,
        timeout: Duration,
    ) -> MusterResult<()> {
        // Only responses appended after this offset can answer the request
        let offset = self.mailboxes().len(team, LEADER_ID).await?;
        self.messenger.deliver(team, &member.id, request).await?;
        info!(team = %team, member = %member.id, request = %request_id, "shutdown requested");

        let response = self
            .await_response(team, &member.id, request_id, request.timestamp, offset, timeout)
            .await?;

        match response {
            Some(entry) if entry.approve == Some(true) => {
                self.supervisor.terminate(team, member).await?;
                self.registry.deactivate_member(team, &member.id).await?;
                info!(team = %team, member = %member.id, "shutdown approved, member deactivated");
                Ok(())
            }
            Some(entry) => {
                info!(team = %team, member = %member.id, "shutdown denied");
                Err(MusterError::ShutdownDenied {
                    member: member.id.clone(),
                    reason: Some(entry.body).filter(|b| !b.is_empty()),
                })
            }
            None => {
                warn!(team = %team, member = %member.id, ?timeout, "shutdown request timed out");
                Err(MusterError::TimedOut {
                    member: member.id.clone(),
                    waited: timeout,
                })
            }
        }
    }

    /// Scan the leader mailbox past `offset` until a matching response lands
    async fn await_response(
        &self,
        team: &str,
        member: &str,
        request_id: &str,
        sent_at: DateTime<Utc>,
        offset: usize,
        timeout: Duration,
    ) -> MusterResult<Option<MailboxEntry>> {
        let deadline = Instant::now() + timeout;
        let notify = self.mailboxes().notifier(team, LEADER_ID);
        loop {
            let notified = notify.notified();

            let fresh = self.mailboxes().read_from(team, LEADER_ID, offset).await?;
            if let Some(entry) = fresh
                .into_iter()
                .find(|e| e.answers_shutdown(member, request_id, sent_at))
            {
                return Ok(Some(entry));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let step = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = notified => debug!(member = %member, "leader mailbox changed"),
                _ = tokio::time::sleep(step) => {}
            }
        }
    }

    /// Terminate and deactivate without asking
    pub async fn force_shutdown(&self, team: &str, member_id: &str) -> MusterResult<()> {
        let record = self.registry.get_team(team).await?;
        let member = record
            .member(member_id)
            .ok_or_else(|| MusterError::member_not_found(team, member_id))?;

        self.supervisor.terminate(team, member).await?;
        self.registry.deactivate_member(team, member_id).await?;
        self.states.remove(&state_key(team, member_id));

        warn!(
            target: "muster::shutdown",
            forced = true,
            team = %team,
            member = %member_id,
            handle = ?member.process_handle,
            "member forcibly terminated"
        );
        Ok(())
    }

    /// Request shutdown of every active member concurrently
    ///
    /// Each member gets its own `per_member` budget, so the whole call takes
    /// roughly one budget rather than their sum.
    pub async fn shutdown_team(
        &self,
        team: &str,
        reason: Option<&str>,
        per_member: Duration,
    ) -> MusterResult<TeamShutdownReport> {
        let record = self.registry.get_team(team).await?;
        let members = record.active_member_ids();
        info!(team = %team, members = members.len(), "team shutdown started");

        let results = join_all(members.iter().map(|id| async move {
            let result = self.request_shutdown(team, id, reason, per_member).await;
            (id.clone(), result)
        }))
        .await;

        let mut report = TeamShutdownReport::default();
        for (member, result) in results {
            match result {
                Ok(()) => report.approved.push(member),
                Err(MusterError::ShutdownDenied { .. }) => report.denied.push(member),
                Err(MusterError::TimedOut { .. }) => report.timed_out.push(member),
                Err(e) => report.failed.push((member, e.to_string())),
            }
        }

        info!(
            team = %team,
            approved = report.approved.len(),
            unresolved = report.unresolved().len(),
            "team shutdown finished"
        );
        Ok(report)
    }

    /// Forget recorded states of a deleted team
    pub fn forget_team(&self, team: &str) {
        let prefix = format!("{team}/");
        self.states.retain(|k, _| !k.starts_with(&prefix));
    }
}

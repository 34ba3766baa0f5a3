//! Team and member records
//!
//! The team descriptor is the one file external tooling reads to render team
//! state, so field names follow the camelCase wire format.

use crate::config::BackendKind;
use crate::error::{MusterError, MusterResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved member id of the leader's own mailbox
pub const LEADER_ID: &str = "team-lead";

/// Recipient alias that fans a message out to every active member
pub const BROADCAST_RECIPIENT: &str = "all";

const MEMBER_COLORS: [&str; 8] = [
    "#4CAF50", "#2196F3", "#FF9800", "#9C27B0", "#E91E63", "#00BCD4", "#FFEB3B", "#795548",
];

/// Where a worker runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Separate execution context (pane or OS process)
    #[default]
    Isolated,
    /// Cooperatively scheduled task inside the leader
    Embedded,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Isolated => write!(f, "isolated"),
            ExecutionMode::Embedded => write!(f, "embedded"),
        }
    }
}

/// Identifies an isolated execution context for liveness checks and termination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    /// Provider that created the context
    pub backend: BackendKind,
    /// Pane id for tmux (`%12`), pid for plain processes
    pub id: String,
}

impl ProcessHandle {
    pub fn new(backend: BackendKind, id: impl Into<String>) -> Self {
        Self {
            backend,
            id: id.into(),
        }
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.id)
    }
}

/// A worker participant in a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Unique within the team, derived from `name`
    pub id: String,
    /// Display name
    pub name: String,
    /// Behavioral template tag, opaque to muster
    pub role_type: String,
    /// Sizing/cost tier, opaque to muster
    pub model_or_capability_class: String,
    pub is_active: bool,
    /// Present only while active and isolated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_handle: Option<ProcessHandle>,
    pub execution_mode: ExecutionMode,
    pub joined_at: DateTime<Utc>,
    /// Display color hint for status tooling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Launcher argv overriding the configured worker command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl Member {
    /// Whether the handle invariant holds for the current flags
    pub fn handle_consistent(&self) -> bool {
        let expects_handle = self.is_active && self.execution_mode == ExecutionMode::Isolated;
        expects_handle == self.process_handle.is_some()
    }
}

/// What the leader asks for when adding a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSpec {
    pub name: String,
    pub role_type: String,
    pub model_or_capability_class: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl MemberSpec {
    pub fn new(name: impl Into<String>, role_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role_type: role_type.into(),
            model_or_capability_class: "default".to_string(),
            execution_mode: ExecutionMode::Isolated,
            command: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_or_capability_class = model.into();
        self
    }

    pub fn embedded(mut self) -> Self {
        self.execution_mode = ExecutionMode::Embedded;
        self
    }

    pub fn with_command(mut self, argv: Vec<String>) -> Self {
        self.command = Some(argv);
        self
    }

    /// The member id this spec will register under
    pub fn member_id(&self) -> MusterResult<String> {
        member_id_from_name(&self.name)
    }
}

/// Derive a member id from a display name
///
/// Lower-cases and replaces each run of characters outside `[a-z0-9_-]` with a
/// single `-`.
pub fn member_id_from_name(name: &str) -> MusterResult<String> {
    let mut id = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !id.is_empty() {
                id.push('-');
            }
            pending_dash = false;
            id.push(c);
        } else {
            pending_dash = true;
        }
    }

    if id.is_empty() {
        return Err(MusterError::InvalidInput(format!(
            "Member name '{name}' has no usable characters"
        )));
    }
    if id == LEADER_ID || id == BROADCAST_RECIPIENT {
        return Err(MusterError::InvalidInput(format!(
            "Member id '{id}' is reserved"
        )));
    }
    Ok(id)
}

/// Display color for the member at `index`
pub fn member_color(index: usize) -> String {
    MEMBER_COLORS[index % MEMBER_COLORS.len()].to_string()
}

/// The authoritative record of a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Identifier of the coordinating process
    pub leader_process_id: String,
    /// Multiplexer target of the leader, used for reply routing and pane placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_session: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Team {
    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn member_mut(&mut self, id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    pub fn active_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.is_active)
    }

    pub fn active_member_ids(&self) -> Vec<String> {
        self.active_members().map(|m| m.id.clone()).collect()
    }

    /// Whether `id` can receive mail in this team
    pub fn has_mailbox(&self, id: &str) -> bool {
        id == LEADER_ID || self.member(id).is_some()
    }
}

//! Error types for muster
//!
//! Every fallible operation in the crate returns [`MusterResult`]. Variants are
//! grouped into categories that decide how callers react:
//! - precondition and structural faults are rejected before any write
//! - environment faults during spawn trigger rollback of partial state
//! - protocol faults (shutdown timed out or denied) are recoverable

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for muster operations
pub type MusterResult<T> = Result<T, MusterError>;

/// Broad classification of a [`MusterError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any state mutation (missing/duplicate records, active members)
    Precondition,
    /// Would violate a task graph invariant
    Structural,
    /// The execution environment is unavailable or the worker died on start
    Environment,
    /// A cooperative protocol step did not complete
    Protocol,
    /// Durable storage failed
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::Structural => "structural",
            ErrorCategory::Environment => "environment",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Main error type for muster
#[derive(Error, Debug)]
pub enum MusterError {
    /// A team, member or task does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A team with this name is already alive
    #[error("Team '{0}' already exists")]
    AlreadyExists(String),

    /// A member with this id is already registered in the team
    #[error("Member '{member}' already exists in team '{team}'")]
    DuplicateMember { team: String, member: String },

    /// Team deletion attempted while members are active
    #[error("Team '{team}' still has active members: {}", .active.join(", "))]
    MembersStillActive { team: String, active: Vec<String> },

    /// Adding the requested edges would close a cycle in the blocking graph
    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// A task cannot start while its blockers are unfinished
    #[error("Task '{task}' is still blocked by: {}", .blockers.join(", "))]
    StillBlocked { task: String, blockers: Vec<String> },

    /// The task state machine does not allow this transition
    #[error("Invalid transition for task '{task}': {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    /// The execution environment (multiplexer, template, binary) is unavailable
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    /// The worker process started but exited during the grace period
    #[error("Spawn failed for '{member}': {reason}")]
    SpawnFailed { member: String, reason: String },

    /// No shutdown response arrived within the wait budget
    #[error("Timed out after {waited:?} waiting for '{member}'")]
    TimedOut { member: String, waited: Duration },

    /// The member answered the shutdown request with a refusal
    #[error("Shutdown denied by '{member}'{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    ShutdownDenied {
        member: String,
        reason: Option<String>,
    },

    /// A shutdown request for this member is still awaiting its outcome
    #[error("Shutdown request already pending for '{0}'")]
    ShutdownPending(String),

    /// Malformed caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MusterError {
    /// Shorthand for a missing team
    pub fn team_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Team",
            name: name.into(),
        }
    }

    /// Shorthand for a missing member
    pub fn member_not_found(team: &str, member: &str) -> Self {
        Self::NotFound {
            kind: "Member",
            name: format!("{member}@{team}"),
        }
    }

    /// Shorthand for a missing task
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Task",
            name: id.into(),
        }
    }

    /// Stable identifier for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::DuplicateMember { .. } => "DUPLICATE_MEMBER",
            Self::MembersStillActive { .. } => "MEMBERS_STILL_ACTIVE",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::StillBlocked { .. } => "STILL_BLOCKED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::PrerequisiteMissing(_) => "PREREQUISITE_MISSING",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::TimedOut { .. } => "TIMED_OUT",
            Self::ShutdownDenied { .. } => "SHUTDOWN_DENIED",
            Self::ShutdownPending(_) => "SHUTDOWN_PENDING",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Which fault family this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. }
            | Self::AlreadyExists(_)
            | Self::DuplicateMember { .. }
            | Self::MembersStillActive { .. }
            | Self::ShutdownPending(_)
            | Self::InvalidInput(_)
            | Self::Config(_) => ErrorCategory::Precondition,
            Self::CycleDetected { .. }
            | Self::StillBlocked { .. }
            | Self::InvalidTransition { .. } => ErrorCategory::Structural,
            Self::PrerequisiteMissing(_) | Self::SpawnFailed { .. } => ErrorCategory::Environment,
            Self::TimedOut { .. } | Self::ShutdownDenied { .. } => ErrorCategory::Protocol,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Storage,
        }
    }

    /// Process exit code reported by the command-line surface
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,
            Self::AlreadyExists(_) => 3,
            Self::CycleDetected { .. } => 4,
            Self::StillBlocked { .. } => 5,
            Self::MembersStillActive { .. } => 6,
            Self::PrerequisiteMissing(_) => 7,
            Self::SpawnFailed { .. } => 8,
            Self::TimedOut { .. } => 9,
            Self::DuplicateMember { .. } => 10,
            Self::InvalidTransition { .. } | Self::InvalidInput(_) => 11,
            Self::ShutdownDenied { .. } => 12,
            Self::ShutdownPending(_) => 13,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) => 1,
        }
    }

    /// Whether retrying the same call later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Protocol | ErrorCategory::Environment
        ) || matches!(self, Self::StillBlocked { .. } | Self::ShutdownPending(_))
    }
}

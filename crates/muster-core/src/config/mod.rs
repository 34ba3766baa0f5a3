//! Configuration management for muster

mod loader;
mod logging_config;
pub mod timeouts;

pub use loader::{apply_env_overrides, load_config, load_from_file};
pub use logging_config::LoggingConfig;

use crate::error::{MusterError, MusterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default configuration file name used by the command-line surface.
pub const DEFAULT_CONFIG_FILE: &str = "muster_config.json";

/// Which execution-context provider hosts isolated workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A dedicated pane in the leader's tmux session
    #[default]
    Tmux,
    /// A plain OS process
    Process,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Tmux => write!(f, "tmux"),
            BackendKind::Process => write!(f, "process"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tmux" => Ok(BackendKind::Tmux),
            "process" => Ok(BackendKind::Process),
            other => Err(MusterError::Config(format!("Unknown backend '{other}'"))),
        }
    }
}

/// Wait budgets and cadences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Shutdown wait for a single member
    pub shutdown_secs: u64,
    /// Per-member shutdown wait when the whole team shuts down
    pub team_shutdown_secs: u64,
    /// Grace period before the post-spawn liveness re-check
    pub spawn_grace_ms: u64,
    /// Fallback mailbox poll interval
    pub poll_interval_ms: u64,
    /// Wait between polite and forced process termination
    pub terminate_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shutdown_secs: timeouts::shutdown::MEMBER_SECS,
            team_shutdown_secs: timeouts::shutdown::TEAM_MEMBER_SECS,
            spawn_grace_ms: timeouts::supervisor::SPAWN_GRACE_MS,
            poll_interval_ms: timeouts::mailbox::POLL_INTERVAL_MS,
            terminate_grace_ms: timeouts::supervisor::TERMINATE_GRACE_MS,
        }
    }
}

impl TimeoutConfig {
    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }

    pub fn team_shutdown(&self) -> Duration {
        Duration::from_secs(self.team_shutdown_secs)
    }

    pub fn spawn_grace(&self) -> Duration {
        Duration::from_millis(self.spawn_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

/// Freshness thresholds for the liveness classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub active_secs: u64,
    pub idle_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            active_secs: timeouts::liveness::ACTIVE_SECS,
            idle_secs: timeouts::liveness::IDLE_SECS,
        }
    }
}

/// Top-level muster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusterConfig {
    /// Root of all durable state (defaults to `~/.muster`)
    pub home_dir: Option<PathBuf>,
    /// Execution-context provider for isolated workers
    pub backend: BackendKind,
    /// Launcher argv for the worker behavioral template
    pub worker_command: Vec<String>,
    pub timeouts: TimeoutConfig,
    pub liveness: LivenessConfig,
    pub logging: LoggingConfig,
}

impl Default for MusterConfig {
    fn default() -> Self {
        Self {
            home_dir: None,
            backend: BackendKind::default(),
            worker_command: vec![
                "muster".to_string(),
                "worker".to_string(),
                "run".to_string(),
            ],
            timeouts: TimeoutConfig::default(),
            liveness: LivenessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MusterConfig {
    /// Resolve the durable state root
    pub fn resolve_home(&self) -> MusterResult<PathBuf> {
        if let Some(home) = &self.home_dir {
            return Ok(home.clone());
        }
        dirs::home_dir()
            .map(|h| h.join(".muster"))
            .ok_or_else(|| MusterError::Config("Cannot determine home directory".to_string()))
    }

    /// Check internal consistency
    pub fn validate(&self) -> MusterResult<()> {
        if self.worker_command.is_empty() || self.worker_command[0].trim().is_empty() {
            return Err(MusterError::Config(
                "worker_command must name a program".to_string(),
            ));
        }
        if self.liveness.active_secs >= self.liveness.idle_secs {
            return Err(MusterError::Config(format!(
                "liveness.active_secs ({}) must be below liveness.idle_secs ({})",
                self.liveness.active_secs, self.liveness.idle_secs
            )));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(MusterError::Config(
                "timeouts.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

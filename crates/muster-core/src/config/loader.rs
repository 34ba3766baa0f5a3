//! File and environment configuration loading
//!
//! Layering: defaults, then the JSON file (if present), then `MUSTER_*`
//! environment variables.

use super::{BackendKind, MusterConfig};
use crate::error::{MusterError, MusterResult};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load configuration from a JSON file
///
/// Returns the default config if the file doesn't exist.
pub fn load_from_file(path: &Path) -> MusterResult<MusterConfig> {
    if !path.exists() {
        debug!("Config file {:?} not found, using defaults", path);
        return Ok(MusterConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        MusterError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        MusterError::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Apply `MUSTER_*` environment variables on top of a loaded config
pub fn apply_env_overrides(config: &mut MusterConfig) -> MusterResult<()> {
    if let Ok(home) = env::var("MUSTER_HOME") {
        if !home.trim().is_empty() {
            config.home_dir = Some(PathBuf::from(home));
        }
    }

    if let Ok(backend) = env::var("MUSTER_BACKEND") {
        config.backend = backend.parse::<BackendKind>()?;
    }

    if let Ok(command) = env::var("MUSTER_WORKER_COMMAND") {
        let argv = shell_words::split(&command).map_err(|e| {
            MusterError::Config(format!("Invalid MUSTER_WORKER_COMMAND: {}", e))
        })?;
        if !argv.is_empty() {
            config.worker_command = argv;
        }
    }

    if let Ok(secs) = env::var("MUSTER_SHUTDOWN_SECS") {
        config.timeouts.shutdown_secs = secs
            .parse()
            .map_err(|_| MusterError::Config("Invalid MUSTER_SHUTDOWN_SECS value".to_string()))?;
    }

    if let Ok(level) = env::var("MUSTER_LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(())
}

/// Load the fully layered configuration and validate it
pub fn load_config(path: &Path) -> MusterResult<MusterConfig> {
    let mut config = load_from_file(path)?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

//! On-disk layout shared by every durable store
//!
//! ```text
//! <root>/teams/<team>/config.json             team descriptor
//! <root>/teams/<team>/inboxes/<member>.jsonl  mailbox log
//! <root>/teams/<team>/inboxes/<member>.cursor read cursor
//! <root>/teams/<team>/logs/<member>.log       isolated worker output
//! <root>/tasks/<team>/<task-id>.json          task record
//! <root>/locks/<scope>/<team>.lock            cross-process writer lock
//! ```

use crate::error::{MusterError, MusterResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Resolves durable paths under one root directory
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn teams_dir(&self) -> PathBuf {
        self.root.join("teams")
    }

    pub fn team_dir(&self, team: &str) -> PathBuf {
        self.teams_dir().join(team)
    }

    pub fn team_config(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("config.json")
    }

    pub fn inbox_dir(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("inboxes")
    }

    pub fn mailbox_log(&self, team: &str, member: &str) -> PathBuf {
        self.inbox_dir(team).join(format!("{member}.jsonl"))
    }

    pub fn mailbox_cursor(&self, team: &str, member: &str) -> PathBuf {
        self.inbox_dir(team).join(format!("{member}.cursor"))
    }

    pub fn log_dir(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("logs")
    }

    pub fn worker_log(&self, team: &str, member: &str) -> PathBuf {
        self.log_dir(team).join(format!("{member}.log"))
    }

    pub fn task_dir(&self, team: &str) -> PathBuf {
        self.root.join("tasks").join(team)
    }

    pub fn task_record(&self, team: &str, task_id: &str) -> PathBuf {
        self.task_dir(team).join(format!("{task_id}.json"))
    }

    /// Lock files outlive their team so a waiter never holds an unlinked lock
    pub fn lock_dir(&self, scope: &str) -> PathBuf {
        self.root.join("locks").join(scope)
    }
}

/// Reject names that would escape the layout or be unreadable on disk
pub fn validate_name(kind: &str, name: &str) -> MusterResult<()> {
    if name.is_empty() || name.len() > 128 {
        return Err(MusterError::InvalidInput(format!(
            "{kind} name must be 1-128 characters"
        )));
    }
    if name.starts_with('.') {
        return Err(MusterError::InvalidInput(format!(
            "{kind} name cannot start with '.': {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(MusterError::InvalidInput(format!(
            "{kind} name may only contain ASCII letters, digits, '-', '_' and '.': {name}"
        )));
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` atomically
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> MusterResult<()> {
    let parent = path.parent().ok_or_else(|| {
        MusterError::InvalidInput(format!("Path has no parent: {}", path.display()))
    })?;
    fs::create_dir_all(parent).await?;

    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!("Wrote {:?}", path);
    Ok(())
}

/// Remove a directory tree, treating an absent directory as success
pub async fn remove_dir_if_exists(path: &Path) -> MusterResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = StoreLayout::new("/srv/muster");
        assert_eq!(
            layout.team_config("alpha"),
            PathBuf::from("/srv/muster/teams/alpha/config.json")
        );
        assert_eq!(
            layout.mailbox_log("alpha", "w1"),
            PathBuf::from("/srv/muster/teams/alpha/inboxes/w1.jsonl")
        );
        assert_eq!(
            layout.task_record("alpha", "abc"),
            PathBuf::from("/srv/muster/tasks/alpha/abc.json")
        );
        assert_eq!(
            layout.lock_dir("registry"),
            PathBuf::from("/srv/muster/locks/registry")
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Team", "t1").is_ok());
        assert!(validate_name("Team", "web-team_2.0").is_ok());
        assert!(validate_name("Team", "").is_err());
        assert!(validate_name("Team", "../etc").is_err());
        assert!(validate_name("Team", ".hidden").is_err());
        assert!(validate_name("Team", "a b").is_err());
    }

    #[tokio::test]
    async fn test_write_json_atomic_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("record.json");

        write_json_atomic(&path, &serde_json::json!({"v": 1})).await.unwrap();
        write_json_atomic(&path, &serde_json::json!({"v": 2})).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["v"], 2);

        // No temp files left behind
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_remove_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_dir_if_exists(&temp.path().join("nope")).await.unwrap();
    }
}

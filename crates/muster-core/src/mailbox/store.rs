//! JSON-lines mailbox storage
//!
//! One `<member>.jsonl` log per mailbox plus a `<member>.cursor` file holding
//! the number of entries already handed to the recipient.

use super::MailboxEntry;
use crate::error::{MusterError, MusterResult};
use crate::locks::KeyedLocks;
use crate::storage::{StoreLayout, validate_name};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Append-only per-member mailboxes on the local filesystem
#[derive(Debug)]
pub struct MailboxStore {
    layout: StoreLayout,
    locks: KeyedLocks,
    notifiers: DashMap<String, Arc<Notify>>,
}

fn key(team: &str, member: &str) -> String {
    format!("{team}/{member}")
}

/// Key of a mailbox whose ids stay inside the inbox directory
fn checked_key(team: &str, member: &str) -> MusterResult<String> {
    validate_name("Team", team)?;
    validate_name("Member", member)?;
    Ok(key(team, member))
}

impl MailboxStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            locks: KeyedLocks::new(),
            notifiers: DashMap::new(),
        }
    }

    /// Create an empty mailbox if it does not exist yet
    pub async fn init(&self, team: &str, member: &str) -> MusterResult<()> {
        let _guard = self.locks.lock(&checked_key(team, member)?).await;
        fs::create_dir_all(self.layout.inbox_dir(team)).await?;

        let log = self.layout.mailbox_log(team, member);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .await?;
        debug!(team = %team, member = %member, "mailbox initialized");
        Ok(())
    }

    /// Whether the mailbox log exists
    pub async fn exists(&self, team: &str, member: &str) -> bool {
        if checked_key(team, member).is_err() {
            return false;
        }
        fs::try_exists(self.layout.mailbox_log(team, member))
            .await
            .unwrap_or(false)
    }

    /// Delete a mailbox; only used to roll back a failed spawn
    pub async fn remove(&self, team: &str, member: &str) -> MusterResult<()> {
        let k = checked_key(team, member)?;
        let guard = self.locks.lock(&k).await;
        for path in [
            self.layout.mailbox_log(team, member),
            self.layout.mailbox_cursor(team, member),
        ] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        drop(guard);
        self.locks.forget(&k);
        self.notifiers.remove(&k);
        Ok(())
    }

    /// Append one entry to `member`'s log and wake in-process waiters
    pub async fn append(&self, team: &str, member: &str, entry: &MailboxEntry) -> MusterResult<()> {
        let k = checked_key(team, member)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        {
            let _guard = self.locks.lock(&k).await;
            let log = self.layout.mailbox_log(team, member);
            let mut file = match OpenOptions::new().create(true).append(true).open(&log).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(MusterError::NotFound {
                        kind: "Mailbox",
                        name: k,
                    });
                }
                Err(e) => return Err(e.into()),
            };
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }

        debug!(team = %team, to = %member, from = %entry.from, kind = %entry.kind, "mailbox append");
        self.notifier(team, member).notify_waiters();
        Ok(())
    }

    /// Every entry in append order, with delivered flags derived from the cursor
    pub async fn read_all(&self, team: &str, member: &str) -> MusterResult<Vec<MailboxEntry>> {
        let mut entries = self.read_log(team, member).await?;
        let cursor = self.read_cursor(team, member).await?;
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.delivered = i < cursor;
        }
        Ok(entries)
    }

    /// Number of entries in the log
    pub async fn len(&self, team: &str, member: &str) -> MusterResult<usize> {
        Ok(self.read_log(team, member).await?.len())
    }

    /// Entries at or after `offset`, without touching the cursor
    pub async fn read_from(
        &self,
        team: &str,
        member: &str,
        offset: usize,
    ) -> MusterResult<Vec<MailboxEntry>> {
        let entries = self.read_all(team, member).await?;
        Ok(entries.into_iter().skip(offset).collect())
    }

    /// Hand over every undelivered entry and advance the cursor past them
    ///
    /// The cursor is written after the entries are read, so a crash in between
    /// re-delivers rather than loses them.
    pub async fn receive(&self, team: &str, member: &str) -> MusterResult<Vec<MailboxEntry>> {
        let _guard = self.locks.lock(&checked_key(team, member)?).await;

        let entries = self.read_log(team, member).await?;
        let cursor = self.read_cursor(team, member).await?.min(entries.len());
        let fresh: Vec<MailboxEntry> = entries
            .into_iter()
            .skip(cursor)
            .map(|mut e| {
                e.delivered = true;
                e
            })
            .collect();

        if !fresh.is_empty() {
            self.write_cursor(team, member, cursor + fresh.len()).await?;
            debug!(team = %team, member = %member, count = fresh.len(), "mailbox received");
        }
        Ok(fresh)
    }

    /// The last `n` entries, without touching the cursor
    pub async fn peek_recent(
        &self,
        team: &str,
        member: &str,
        n: usize,
    ) -> MusterResult<Vec<MailboxEntry>> {
        let entries = self.read_all(team, member).await?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.into_iter().skip(skip).collect())
    }

    /// Newest timestamp of any entry `member` authored across the team's mailboxes
    pub async fn last_activity(
        &self,
        team: &str,
        member: &str,
    ) -> MusterResult<Option<DateTime<Utc>>> {
        validate_name("Team", team)?;
        let inbox_dir = self.layout.inbox_dir(team);
        if !fs::try_exists(&inbox_dir).await? {
            return Ok(None);
        }

        let mut latest: Option<DateTime<Utc>> = None;
        let mut dir = fs::read_dir(&inbox_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }
            for item in parse_log(&path).await? {
                if item.from == member && latest.is_none_or(|t| item.timestamp > t) {
                    latest = Some(item.timestamp);
                }
            }
        }
        Ok(latest)
    }

    /// Shared wakeup handle for appends to one mailbox
    pub fn notifier(&self, team: &str, member: &str) -> Arc<Notify> {
        self.notifiers
            .entry(key(team, member))
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wait until an in-process append lands in the mailbox or `timeout` passes
    ///
    /// Appends from other processes are not signalled; callers re-read on return
    /// and use `timeout` as their poll interval.
    pub async fn wait_for_append(&self, team: &str, member: &str, timeout: Duration) {
        let notify = self.notifier(team, member);
        let _ = tokio::time::timeout(timeout, notify.notified()).await;
    }

    async fn read_log(&self, team: &str, member: &str) -> MusterResult<Vec<MailboxEntry>> {
        let name = checked_key(team, member)?;
        let path = self.layout.mailbox_log(team, member);
        if !fs::try_exists(&path).await? {
            return Err(MusterError::NotFound { kind: "Mailbox", name });
        }
        parse_log(&path).await
    }

    async fn read_cursor(&self, team: &str, member: &str) -> MusterResult<usize> {
        let path = self.layout.mailbox_cursor(team, member);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content.trim().parse().unwrap_or_else(|_| {
                warn!("Corrupt mailbox cursor {:?}, redelivering from start", path);
                0
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_cursor(&self, team: &str, member: &str, value: usize) -> MusterResult<()> {
        checked_key(team, member)?;
        let path = self.layout.mailbox_cursor(team, member);
        let tmp = path.with_extension("cursor.tmp");
        fs::write(&tmp, value.to_string()).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

async fn parse_log(path: &Path) -> MusterResult<Vec<MailboxEntry>> {
    let content = fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MailboxEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping unreadable entry {:?}:{}: {}", path, lineno + 1, e),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MessageKind;
    use tempfile::TempDir;

    async fn create_test_store() -> (MailboxStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = MailboxStore::new(StoreLayout::new(temp_dir.path()));
        store.init("t1", "w1").await.unwrap();
        (store, temp_dir)
    }

    fn msg(from: &str, body: &str) -> MailboxEntry {
        MailboxEntry::new(from, MessageKind::Message, body)
    }

    #[tokio::test]
    async fn test_member_ids_cannot_escape_inbox_dir() {
        let (store, temp) = create_test_store().await;

        for member in ["../../x", "../w1", ".cursor", "a/b"] {
            let err = store.receive("t1", member).await.unwrap_err();
            assert!(matches!(err, MusterError::InvalidInput(_)), "{member}");
            let err = store
                .append("t1", member, &msg("team-lead", "A"))
                .await
                .unwrap_err();
            assert!(matches!(err, MusterError::InvalidInput(_)), "{member}");
            assert!(store.peek_recent("t1", member, 1).await.is_err());
            assert!(!store.exists("t1", member).await);
        }
        assert!(store.init("../t1", "w1").await.is_err());
        assert!(!temp.path().join("x.jsonl").exists());
        assert!(!temp.path().join("x.cursor").exists());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let (store, _temp) = create_test_store().await;
        store.append("t1", "w1", &msg("team-lead", "A")).await.unwrap();
        store.append("t1", "w1", &msg("team-lead", "B")).await.unwrap();

        let bodies: Vec<String> = store
            .read_all("t1", "w1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.body)
            .collect();
        assert_eq!(bodies, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_receive_advances_cursor_once() {
        let (store, _temp) = create_test_store().await;
        store.append("t1", "w1", &msg("team-lead", "A")).await.unwrap();

        let first = store.receive("t1", "w1").await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].delivered);
        assert!(store.receive("t1", "w1").await.unwrap().is_empty());

        store.append("t1", "w1", &msg("team-lead", "B")).await.unwrap();
        let second = store.receive("t1", "w1").await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].body, "B");
    }

    #[tokio::test]
    async fn test_peek_recent_does_not_deliver() {
        let (store, _temp) = create_test_store().await;
        for body in ["A", "B", "C"] {
            store.append("t1", "w1", &msg("team-lead", body)).await.unwrap();
        }

        let recent = store.peek_recent("t1", "w1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].body, "B");
        assert!(recent.iter().all(|e| !e.delivered));

        // Still undelivered after peeking
        assert_eq!(store.receive("t1", "w1").await.unwrap().len(), 3);
        let recent = store.peek_recent("t1", "w1", 10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().all(|e| e.delivered));
    }

    #[tokio::test]
    async fn test_missing_mailbox() {
        let (store, _temp) = create_test_store().await;
        let err = store.read_all("t1", "ghost").await.unwrap_err();
        assert!(matches!(err, MusterError::NotFound { kind: "Mailbox", .. }));

        let err = store
            .append("gone-team", "w1", &msg("team-lead", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let (store, temp) = create_test_store().await;
        store.append("t1", "w1", &msg("team-lead", "A")).await.unwrap();
        let log = temp.path().join("teams/t1/inboxes/w1.jsonl");
        let mut content = std::fs::read_to_string(&log).unwrap();
        content.push_str("{\"id\":\"trunc");
        std::fs::write(&log, content).unwrap();

        assert_eq!(store.read_all("t1", "w1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_activity_scans_all_mailboxes() {
        let (store, _temp) = create_test_store().await;
        store.init("t1", "team-lead").await.unwrap();
        assert!(store.last_activity("t1", "w1").await.unwrap().is_none());

        let first = msg("w1", "to lead");
        store.append("t1", "team-lead", &first).await.unwrap();
        let mut later = msg("w1", "to self");
        later.timestamp = first.timestamp + chrono::Duration::seconds(5);
        store.append("t1", "w1", &later).await.unwrap();

        assert_eq!(
            store.last_activity("t1", "w1").await.unwrap(),
            Some(later.timestamp)
        );
    }

    #[tokio::test]
    async fn test_wait_for_append_wakes() {
        let (store, _temp) = create_test_store().await;
        let store = Arc::new(store);

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let start = std::time::Instant::now();
                store
                    .wait_for_append("t1", "w1", Duration::from_secs(5))
                    .await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.append("t1", "w1", &msg("team-lead", "wake")).await.unwrap();
        let waited = waiter.await.unwrap();
        assert!(waited < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_remove_for_rollback() {
        let (store, _temp) = create_test_store().await;
        store.append("t1", "w1", &msg("team-lead", "A")).await.unwrap();
        store.receive("t1", "w1").await.unwrap();

        store.remove("t1", "w1").await.unwrap();
        assert!(!store.exists("t1", "w1").await);
    }
}

//! Recipient validation and broadcast fan-out on top of the mailbox store

use super::{MailboxEntry, MailboxStore, MessageKind};
use crate::error::{MusterError, MusterResult};
use crate::team::{BROADCAST_RECIPIENT, Team, TeamRegistry};
use std::sync::Arc;
use tracing::info;

/// Sends messages between the leader and members of a team
#[derive(Debug, Clone)]
pub struct Messenger {
    registry: Arc<TeamRegistry>,
    store: Arc<MailboxStore>,
}

impl Messenger {
    pub fn new(registry: Arc<TeamRegistry>, store: Arc<MailboxStore>) -> Self {
        Self { registry, store }
    }

    pub fn store(&self) -> &Arc<MailboxStore> {
        &self.store
    }

    /// Send a message; `recipient = "all"` fans out one entry per active member
    ///
    /// Returns the entries appended, one per recipient mailbox.
    pub async fn send(
        &self,
        team: &str,
        from: &str,
        recipient: &str,
        kind: MessageKind,
        body: &str,
        summary: Option<&str>,
    ) -> MusterResult<Vec<MailboxEntry>> {
        let record = self.registry.get_team(team).await?;
        ensure_sender(&record, from)?;

        if recipient == BROADCAST_RECIPIENT {
            return self.broadcast(&record, from, body, summary).await;
        }
        if kind == MessageKind::Broadcast {
            return Err(MusterError::InvalidInput(format!(
                "broadcast must be addressed to '{BROADCAST_RECIPIENT}'"
            )));
        }

        let mut entry = MailboxEntry::new(from, kind, body);
        entry.summary = summary.map(str::to_string);
        self.deliver_to(&record, recipient, &entry).await?;
        Ok(vec![entry])
    }

    /// Append a prebuilt entry to one recipient's mailbox
    pub async fn deliver(&self, team: &str, recipient: &str, entry: &MailboxEntry) -> MusterResult<()> {
        let record = self.registry.get_team(team).await?;
        self.deliver_to(&record, recipient, entry).await
    }

    async fn deliver_to(&self, team: &Team, recipient: &str, entry: &MailboxEntry) -> MusterResult<()> {
        if !team.has_mailbox(recipient) {
            return Err(MusterError::member_not_found(&team.name, recipient));
        }
        self.store.append(&team.name, recipient, entry).await
    }

    async fn broadcast(
        &self,
        team: &Team,
        from: &str,
        body: &str,
        summary: Option<&str>,
    ) -> MusterResult<Vec<MailboxEntry>> {
        let mut sent = Vec::new();
        for member in team.active_members().filter(|m| m.id != from) {
            let mut entry = MailboxEntry::new(from, MessageKind::Broadcast, body);
            entry.summary = summary.map(str::to_string);
            self.store.append(&team.name, &member.id, &entry).await?;
            sent.push(entry);
        }
        info!(team = %team.name, from = %from, recipients = sent.len(), "broadcast sent");
        Ok(sent)
    }
}

fn ensure_sender(team: &Team, from: &str) -> MusterResult<()> {
    if team.has_mailbox(from) {
        Ok(())
    } else {
        Err(MusterError::member_not_found(&team.name, from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreLayout;
    use crate::team::{LEADER_ID, MemberSpec};
    use tempfile::TempDir;

    async fn setup() -> (Messenger, Arc<TeamRegistry>, TempDir) {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let registry = Arc::new(TeamRegistry::new(layout.clone()));
        let store = Arc::new(MailboxStore::new(layout));

        registry.create_team("t1", None, "leader", None).await.unwrap();
        store.init("t1", LEADER_ID).await.unwrap();
        for name in ["w1", "w2", "w3"] {
            registry
                .add_member("t1", &MemberSpec::new(name, "r").embedded())
                .await
                .unwrap();
            store.init("t1", name).await.unwrap();
        }
        registry.activate_member("t1", "w1", None).await.unwrap();
        registry.activate_member("t1", "w2", None).await.unwrap();

        (Messenger::new(registry.clone(), store), registry, temp)
    }

    #[tokio::test]
    async fn test_direct_message() {
        let (messenger, _registry, _temp) = setup().await;
        let sent = messenger
            .send("t1", LEADER_ID, "w3", MessageKind::Message, "hello", Some("greeting"))
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);

        let inbox = messenger.store().read_all("t1", "w3").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].summary.as_deref(), Some("greeting"));
    }

    #[tokio::test]
    async fn test_broadcast_fans_out_to_active_members() {
        let (messenger, _registry, _temp) = setup().await;
        let sent = messenger
            .send("t1", LEADER_ID, "all", MessageKind::Message, "standup", None)
            .await
            .unwrap();

        // w3 is inactive
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].id, sent[1].id);
        assert!(sent.iter().all(|e| e.kind == MessageKind::Broadcast));

        // Independent cursors
        assert_eq!(messenger.store().receive("t1", "w1").await.unwrap().len(), 1);
        assert_eq!(messenger.store().receive("t1", "w2").await.unwrap().len(), 1);
        assert!(messenger.store().read_all("t1", "w3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let (messenger, _registry, _temp) = setup().await;
        let sent = messenger
            .send("t1", "w1", "all", MessageKind::Broadcast, "done", None)
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert!(messenger.store().read_all("t1", "w1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_parties() {
        let (messenger, _registry, _temp) = setup().await;
        let err = messenger
            .send("t1", LEADER_ID, "ghost", MessageKind::Message, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::NotFound { .. }));

        let err = messenger
            .send("t1", "ghost", "w1", MessageKind::Message, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::NotFound { .. }));

        let err = messenger
            .send("t1", LEADER_ID, "w1", MessageKind::Broadcast, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::InvalidInput(_)));
    }
}

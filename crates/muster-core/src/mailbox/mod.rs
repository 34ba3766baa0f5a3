//! Durable mailboxes and the messaging protocol
//!
//! Each member (and the leader, under [`LEADER_ID`](crate::team::LEADER_ID))
//! owns an append-only log. Recipients poll their own log; ordering holds
//! within one mailbox only.

mod messenger;
mod store;

pub use messenger::Messenger;
pub use store::MailboxStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kinds of mailbox entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Direct message
    Message,
    /// One member's copy of a message sent to everyone
    Broadcast,
    /// Work handed to the recipient
    TaskAssignment,
    /// Leader asks a member to wind down
    ShutdownRequest,
    /// Member answers a shutdown request
    ShutdownResponse,
    /// Member has no remaining unblocked tasks
    IdleNotification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Message => "message",
            MessageKind::Broadcast => "broadcast",
            MessageKind::TaskAssignment => "task_assignment",
            MessageKind::ShutdownRequest => "shutdown_request",
            MessageKind::ShutdownResponse => "shutdown_response",
            MessageKind::IdleNotification => "idle_notification",
        };
        write!(f, "{s}")
    }
}

/// One immutable entry in a mailbox log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxEntry {
    pub id: String,
    pub from: String,
    pub kind: MessageKind,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Correlates a shutdown response with its request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Present on shutdown responses only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve: Option<bool>,
    /// Task referenced by assignments and dependency notices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Derived from the read cursor, never written to the log
    #[serde(default, skip_serializing)]
    pub delivered: bool,
}

impl MailboxEntry {
    pub fn new(from: impl Into<String>, kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            kind,
            body: body.into(),
            summary: None,
            timestamp: Utc::now(),
            request_id: None,
            approve: None,
            task_id: None,
            delivered: false,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// A shutdown request; its own id doubles as the request id
    pub fn shutdown_request(from: impl Into<String>, reason: Option<&str>) -> Self {
        let mut entry = Self::new(
            from,
            MessageKind::ShutdownRequest,
            reason.unwrap_or("Please finish your current step and shut down."),
        )
        .with_summary("shutdown requested");
        entry.request_id = Some(entry.id.clone());
        entry
    }

    pub fn shutdown_response(
        from: impl Into<String>,
        request_id: impl Into<String>,
        approve: bool,
        reason: Option<&str>,
    ) -> Self {
        let default_body = if approve {
            "Shutdown approved."
        } else {
            "Shutdown denied."
        };
        let mut entry = Self::new(
            from,
            MessageKind::ShutdownResponse,
            reason.unwrap_or(default_body),
        )
        .with_summary(if approve {
            "shutdown approved"
        } else {
            "shutdown denied"
        });
        entry.request_id = Some(request_id.into());
        entry.approve = Some(approve);
        entry
    }

    pub fn idle_notification(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(from, MessageKind::IdleNotification, body).with_summary("idle")
    }

    /// Whether this entry answers the shutdown request `request_id` sent at `sent_at`
    pub fn answers_shutdown(&self, member: &str, request_id: &str, sent_at: DateTime<Utc>) -> bool {
        if self.kind != MessageKind::ShutdownResponse || self.from != member {
            return false;
        }
        match &self.request_id {
            Some(id) => id == request_id,
            None => self.timestamp >= sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&MessageKind::ShutdownResponse).unwrap(),
            "\"shutdown_response\""
        );
        assert_eq!(MessageKind::IdleNotification.to_string(), "idle_notification");
    }

    #[test]
    fn test_delivered_is_not_persisted() {
        let mut entry = MailboxEntry::new("team-lead", MessageKind::Message, "hi");
        entry.delivered = true;
        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains("delivered"));

        let back: MailboxEntry = serde_json::from_str(&line).unwrap();
        assert!(!back.delivered);
        assert_eq!(back.body, "hi");
    }

    #[test]
    fn test_shutdown_matching() {
        let request = MailboxEntry::shutdown_request("team-lead", None);
        let request_id = request.request_id.clone().unwrap();
        assert_eq!(request_id, request.id);

        let response = MailboxEntry::shutdown_response("w1", &request_id, true, None);
        assert!(response.answers_shutdown("w1", &request_id, request.timestamp));
        assert!(!response.answers_shutdown("w2", &request_id, request.timestamp));
        assert!(!response.answers_shutdown("w1", "other", request.timestamp));

        let mut loose = MailboxEntry::new("w1", MessageKind::ShutdownResponse, "ok");
        loose.approve = Some(true);
        assert!(loose.answers_shutdown("w1", &request_id, request.timestamp));

        let chat = MailboxEntry::new("w1", MessageKind::Message, "ok");
        assert!(!chat.answers_shutdown("w1", &request_id, request.timestamp));
    }
}

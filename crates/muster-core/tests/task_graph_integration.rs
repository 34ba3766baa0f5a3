//! Integration tests for the task graph through the leader facade

mod common;

use common::{FakeBackend, SILENT_ROLE, test_leader};
use muster_core::{MemberSpec, MessageKind, MusterError, NewTask, TaskStatus};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_blocked_task_starts_after_blocker_completes() {
    let temp = TempDir::new().unwrap();
    let leader = test_leader(&temp, Arc::new(FakeBackend::default()));

    leader.create_team("t1", None).await.unwrap();
    leader
        .add_member("t1", &MemberSpec::new("w1", SILENT_ROLE).embedded())
        .await
        .unwrap();

    let build = leader
        .create_task("t1", NewTask::new("build").owner("w1"))
        .await
        .unwrap();
    // deploy has no owner; the notice goes to whoever owns build
    let deploy = leader
        .create_task("t1", NewTask::new("deploy").blocked_by([build.id.clone()]))
        .await
        .unwrap();

    let err = leader
        .transition_task("t1", &deploy.id, TaskStatus::InProgress)
        .await
        .unwrap_err();
    match err {
        MusterError::StillBlocked { blockers, .. } => assert_eq!(blockers, vec![build.id.clone()]),
        other => panic!("expected StillBlocked, got {other}"),
    }
    assert_eq!(err_exit_code(&leader, &deploy.id).await, 5);

    leader
        .transition_task("t1", &build.id, TaskStatus::InProgress)
        .await
        .unwrap();
    leader
        .transition_task("t1", &build.id, TaskStatus::Completed)
        .await
        .unwrap();

    let started = leader
        .transition_task("t1", &deploy.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);

    let inbox = leader.mailboxes().read_all("t1", "w1").await.unwrap();
    let notice = inbox
        .iter()
        .find(|e| e.kind == MessageKind::Message && e.task_id.as_deref() == Some(build.id.as_str()))
        .expect("dependency notice for build");
    assert!(notice.body.contains("build"));

    let blockers = leader.list_blockers("t1", &deploy.id).await.unwrap();
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].subject, "build");
}

async fn err_exit_code(leader: &muster_core::TeamLeader, task_id: &str) -> i32 {
    leader
        .transition_task("t1", task_id, TaskStatus::InProgress)
        .await
        .unwrap_err()
        .exit_code()
}

#[tokio::test]
async fn test_multi_hop_cycle_rejected_and_graph_unchanged() {
    let temp = TempDir::new().unwrap();
    let leader = test_leader(&temp, Arc::new(FakeBackend::default()));
    leader.create_team("t1", None).await.unwrap();

    let a = leader.create_task("t1", NewTask::new("a")).await.unwrap();
    let b = leader
        .create_task("t1", NewTask::new("b").blocked_by([a.id.clone()]))
        .await
        .unwrap();
    let c = leader
        .create_task("t1", NewTask::new("c").blocked_by([b.id.clone()]))
        .await
        .unwrap();
    let d = leader
        .create_task("t1", NewTask::new("d").blocked_by([c.id.clone()]))
        .await
        .unwrap();

    let before = leader.list_tasks("t1").await.unwrap();

    // Two hops
    let err = leader.add_dependency("t1", &a.id, &b.id).await.unwrap_err();
    assert!(matches!(err, MusterError::CycleDetected { .. }));

    // Four hops
    let err = leader.add_dependency("t1", &a.id, &d.id).await.unwrap_err();
    let MusterError::CycleDetected { path } = err else {
        panic!("expected CycleDetected");
    };
    assert_eq!(path.len(), 5);
    assert_eq!(path.first(), path.last());

    assert_eq!(leader.list_tasks("t1").await.unwrap(), before);

    // A non-cyclic edge is still accepted afterwards
    let updated = leader.add_dependency("t1", &d.id, &a.id).await.unwrap();
    assert!(updated.blocked_by.contains(&a.id));
}

#[tokio::test]
async fn test_cancel_and_reassign() {
    let temp = TempDir::new().unwrap();
    let leader = test_leader(&temp, Arc::new(FakeBackend::default()));
    leader.create_team("t1", None).await.unwrap();
    for name in ["w1", "w2"] {
        leader
            .add_member("t1", &MemberSpec::new(name, SILENT_ROLE).embedded())
            .await
            .unwrap();
    }

    let task = leader
        .create_task("t1", NewTask::new("docs").owner("w1"))
        .await
        .unwrap();
    let moved = leader.assign_task("t1", &task.id, Some("w2")).await.unwrap();
    assert_eq!(moved.owner.as_deref(), Some("w2"));

    let w2_inbox = leader.mailboxes().read_all("t1", "w2").await.unwrap();
    assert_eq!(w2_inbox.len(), 1);
    assert_eq!(w2_inbox[0].kind, MessageKind::TaskAssignment);

    let cancelled = leader
        .transition_task("t1", &task.id, TaskStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let err = leader
        .assign_task("t1", &task.id, Some("w1"))
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::InvalidInput(_)));

    let err = leader
        .assign_task("t1", &task.id, Some("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::NotFound { .. }));
}

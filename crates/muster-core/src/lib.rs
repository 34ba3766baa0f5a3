//! Muster Core Library
//!
//! This crate provides the substrate for running a team of worker processes
//! under one leader: the team registry, durable mailboxes, the task graph,
//! process supervision, liveness monitoring and the shutdown protocol.

pub mod config;
pub mod error;
pub mod leader;
pub mod liveness;
pub mod locks;
pub mod mailbox;
pub mod shutdown;
pub mod storage;
pub mod supervisor;
pub mod tasks;
pub mod team;
pub mod worker;

// Re-export commonly used types
pub use config::{BackendKind, LoggingConfig, MusterConfig, load_config};
pub use error::{ErrorCategory, MusterError, MusterResult};
pub use leader::TeamLeader;
pub use liveness::{Liveness, LivenessMonitor, MemberStatus};
pub use mailbox::{MailboxEntry, MailboxStore, MessageKind, Messenger};
pub use shutdown::{ShutdownCoordinator, ShutdownState, TeamShutdownReport};
pub use storage::StoreLayout;
pub use supervisor::{
    EmbeddedRuntime, EmbeddedWorker, ExecutionBackend, LeaderContext, ProcessBackend,
    ProcessSupervisor, SpawnRequest, TmuxBackend,
};
pub use tasks::{NewTask, Task, TaskPriority, TaskStatus, TaskStore};
pub use team::{
    BROADCAST_RECIPIENT, ExecutionMode, LEADER_ID, Member, MemberSpec, ProcessHandle, Team,
    TeamRegistry,
};
pub use worker::{COOPERATIVE_ROLE, CooperativeWorker, WorkerClient, WorkerIdentity, WorkerServices};

//! CLI argument definitions using clap
//!
//! Leader-side commands operate on a team by name; worker-side commands live
//! under `muster worker` and default their identity to the variables the
//! supervisor wires into every spawned worker.

use clap::{Parser, Subcommand};
use muster_core::config::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "muster")]
#[command(about = "Muster - run a team of workers under one leader")]
#[command(
    long_about = r#"Muster - run a team of workers under one leader

USAGE:
  muster create-team <team>                  # Create a team
  muster add-member <team> <name> <role>     # Spawn a worker
  muster create-task <team> <subject>        # Add work to the task graph
  muster status <team>                       # Liveness table
  muster request-shutdown <team> --all       # Wind the team down
  muster delete-team <team>                  # Purge a stopped team

WORKER COMMANDS:
  muster worker inbox                        # Read own mailbox
  muster worker respond-shutdown <id>        # Approve a shutdown request

For detailed help: muster --help"#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Override the state directory
    #[arg(long, global = true, env = "MUSTER_HOME")]
    pub home: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Create a new team
    CreateTeam {
        team: String,
        /// Free-form description
        #[arg(long, short)]
        description: Option<String>,
    },

    /// List all teams
    ListTeams,

    /// Shut every member down and delete the team
    DeleteTeam {
        team: String,
        /// Terminate members that do not approve
        #[arg(long)]
        force: bool,
    },

    /// Register and spawn a new member
    AddMember {
        team: String,
        name: String,
        /// Behavioral template tag
        role: String,
        /// Sizing or capability class
        #[arg(long, short)]
        model: Option<String>,
        /// Launcher argv overriding the configured worker command
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Show the liveness of every member
    Status { team: String },

    /// Deactivate members whose execution context has vanished
    Reconcile { team: String },

    /// Send a message; use `all` as recipient to broadcast
    SendMessage {
        team: String,
        to: String,
        body: String,
        /// Sender id (defaults to the leader)
        #[arg(long, default_value = muster_core::LEADER_ID)]
        from: String,
        #[arg(long, short)]
        summary: Option<String>,
    },

    /// Show the newest entries of a mailbox without consuming them
    Peek {
        team: String,
        /// Mailbox owner (defaults to the leader)
        #[arg(default_value = muster_core::LEADER_ID)]
        member: String,
        #[arg(long, short = 'n', default_value_t = 10)]
        count: usize,
    },

    /// Receive unread entries from the leader mailbox
    Receive { team: String },

    /// Add a task to the team's graph
    CreateTask {
        team: String,
        subject: String,
        #[arg(long, short)]
        description: Option<String>,
        #[arg(long, short)]
        owner: Option<String>,
        /// low, normal, high or urgent
        #[arg(long, short, default_value = "normal")]
        priority: String,
        /// Task ids this task waits on
        #[arg(long = "blocked-by", value_delimiter = ',')]
        blocked_by: Vec<String>,
        /// Pending task ids that wait on this task
        #[arg(long, value_delimiter = ',')]
        blocks: Vec<String>,
    },

    /// Move a task to a new status
    TransitionTask {
        team: String,
        /// Task id or unique prefix
        task: String,
        /// pending, in_progress, completed or cancelled
        status: String,
    },

    /// Change the owner of a task
    AssignTask {
        team: String,
        task: String,
        /// New owner; omit to clear
        owner: Option<String>,
    },

    /// Make a task wait on another
    AddDependency {
        team: String,
        task: String,
        blocker: String,
    },

    /// Remove a blocking edge
    RemoveDependency {
        team: String,
        task: String,
        blocker: String,
    },

    /// List what a task is waiting on
    Blockers { team: String, task: String },

    /// List every task of a team
    ListTasks { team: String },

    /// Ask a member, or with --all every member, to shut down
    RequestShutdown {
        team: String,
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        member: Option<String>,
        #[arg(long)]
        all: bool,
    },

    /// Terminate a member without asking
    ForceShutdown { team: String, member: String },

    /// Commands run by a worker about itself
    Worker {
        /// Team name
        #[arg(long, env = "MUSTER_TEAM_NAME")]
        team: String,
        /// Own member id
        #[arg(long = "as", env = "MUSTER_AGENT_ID")]
        member: String,
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum WorkerAction {
    /// Run the cooperative worker loop until asked to shut down
    Run,

    /// Receive unread entries from the own mailbox
    Inbox {
        /// Wait up to this many seconds for something to arrive
        #[arg(long, default_value_t = 0)]
        wait: u64,
    },

    /// Message the leader, a teammate, or `all`
    Send {
        to: String,
        body: String,
        #[arg(long, short)]
        summary: Option<String>,
    },

    /// Answer a shutdown request
    RespondShutdown {
        request_id: String,
        /// Refuse instead of approving
        #[arg(long)]
        deny: bool,
        #[arg(long, short)]
        reason: Option<String>,
    },

    /// Tell the leader there is nothing left to do
    Idle {
        #[arg(default_value = "No unblocked tasks remaining.")]
        message: String,
    },

    /// List own unfinished tasks
    Tasks,

    /// Start one of the own tasks
    Start { task: String },

    /// Complete one of the own tasks
    Complete { task: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a configuration file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

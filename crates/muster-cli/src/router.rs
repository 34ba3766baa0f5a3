//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction, WorkerAction};
use crate::commands::{self, tasks::CreateTaskArgs};
use crate::console::CliConsole;
use anyhow::Result;
use muster_core::{MemberSpec, MusterConfig, StoreLayout, TaskStatus, TeamLeader, WorkerServices};

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli, config: MusterConfig) -> Result<()> {
    let console = CliConsole::new(cli.verbose, cli.json);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&console, &cli.config_file, &config).await,
            ConfigAction::Init { force } => {
                commands::config::init(&console, &cli.config_file, force).await
            }
        },
        Commands::Worker {
            team,
            member,
            action,
        } => route_worker(&console, &config, &team, &member, action).await,
        command => {
            let leader = TeamLeader::new(config)?;
            route_leader(&leader, &console, command).await
        }
    }
}

async fn route_leader(leader: &TeamLeader, console: &CliConsole, command: Commands) -> Result<()> {
    match command {
        Commands::CreateTeam { team, description } => {
            commands::team::create(leader, console, &team, description.as_deref()).await
        }
        Commands::ListTeams => commands::team::list(leader, console).await,
        Commands::DeleteTeam { team, force } => {
            commands::team::delete(leader, console, &team, force).await
        }
        Commands::AddMember {
            team,
            name,
            role,
            model,
            command,
        } => {
            let mut spec = MemberSpec::new(name, role);
            if let Some(model) = model {
                spec = spec.with_model(model);
            }
            if !command.is_empty() {
                spec = spec.with_command(command);
            }
            commands::team::add_member(leader, console, &team, spec).await
        }
        Commands::Status { team } => commands::team::status(leader, console, &team).await,
        Commands::Reconcile { team } => commands::team::reconcile(leader, console, &team).await,

        Commands::SendMessage {
            team,
            to,
            body,
            from,
            summary,
        } => {
            commands::messages::send(leader, console, &team, &from, &to, &body, summary.as_deref())
                .await
        }
        Commands::Peek {
            team,
            member,
            count,
        } => commands::messages::peek(leader, console, &team, &member, count).await,
        Commands::Receive { team } => commands::messages::receive(leader, console, &team).await,

        Commands::CreateTask {
            team,
            subject,
            description,
            owner,
            priority,
            blocked_by,
            blocks,
        } => {
            let args = CreateTaskArgs {
                subject,
                description,
                owner,
                priority,
                blocked_by,
                blocks,
            };
            commands::tasks::create(leader, console, &team, args).await
        }
        Commands::TransitionTask { team, task, status } => {
            commands::tasks::transition(leader, console, &team, &task, &status).await
        }
        Commands::AssignTask { team, task, owner } => {
            commands::tasks::assign(leader, console, &team, &task, owner.as_deref()).await
        }
        Commands::AddDependency {
            team,
            task,
            blocker,
        } => commands::tasks::add_dependency(leader, console, &team, &task, &blocker).await,
        Commands::RemoveDependency {
            team,
            task,
            blocker,
        } => commands::tasks::remove_dependency(leader, console, &team, &task, &blocker).await,
        Commands::Blockers { team, task } => {
            commands::tasks::blockers(leader, console, &team, &task).await
        }
        Commands::ListTasks { team } => commands::tasks::list(leader, console, &team).await,

        Commands::RequestShutdown { team, member, all } => match member {
            Some(member) if !all => {
                commands::shutdown::request(leader, console, &team, &member).await
            }
            _ => commands::shutdown::request_all(leader, console, &team).await,
        },
        Commands::ForceShutdown { team, member } => {
            commands::shutdown::force(leader, console, &team, &member).await
        }

        Commands::Config { .. } | Commands::Worker { .. } => {
            anyhow::bail!("not a leader command")
        }
    }
}

async fn route_worker(
    console: &CliConsole,
    config: &MusterConfig,
    team: &str,
    member: &str,
    action: WorkerAction,
) -> Result<()> {
    let layout = StoreLayout::new(config.resolve_home()?);
    let client =
        WorkerServices::open(layout, config.timeouts.poll_interval()).client(team, member)?;

    match action {
        WorkerAction::Run => commands::worker::run(client).await,
        WorkerAction::Inbox { wait } => commands::worker::inbox(&client, console, wait).await,
        WorkerAction::Send { to, body, summary } => {
            commands::worker::send(&client, console, &to, &body, summary.as_deref()).await
        }
        WorkerAction::RespondShutdown {
            request_id,
            deny,
            reason,
        } => {
            commands::worker::respond_shutdown(
                &client,
                console,
                &request_id,
                !deny,
                reason.as_deref(),
            )
            .await
        }
        WorkerAction::Idle { message } => commands::worker::idle(&client, console, &message).await,
        WorkerAction::Tasks => commands::worker::tasks(&client, console).await,
        WorkerAction::Start { task } => {
            commands::worker::transition(&client, console, &task, TaskStatus::InProgress).await
        }
        WorkerAction::Complete { task } => {
            commands::worker::transition(&client, console, &task, TaskStatus::Completed).await
        }
    }
}

//! CLI console utilities

use colored::*;
use muster_core::{Liveness, MailboxEntry, MemberStatus, Task, TaskStatus, Team};
use serde_json::Value;

/// CLI console for formatted output
pub struct CliConsole {
    verbose: bool,
    json: bool,
}

impl CliConsole {
    pub const fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.verbose && !self.json {
            println!("{} {}", "ℹ".blue().bold(), message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.json {
            println!("{} {}", "✓".green().bold(), message.green());
        }
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        if !self.json {
            println!("{} {}", "⚠".yellow().bold(), message.yellow());
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    /// Print a header
    pub fn print_header(&self, title: &str) {
        if self.json {
            return;
        }
        println!();
        println!("{}", title.bold().underline());
        println!("{}", "=".repeat(title.len()).dimmed());
    }

    /// Emit a value when JSON output was requested; returns whether it did
    pub fn emit_json(&self, value: Value) -> bool {
        if self.json {
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(e) => self.error(&format!("Failed to render JSON: {e}")),
            }
        }
        self.json
    }

    pub fn print_team(&self, team: &Team) {
        let active = team.active_members().count();
        println!(
            "{}  {} member(s), {} active  {}",
            team.name.bold(),
            team.members.len(),
            active,
            team.description.as_deref().unwrap_or("").dimmed()
        );
    }

    pub fn print_status(&self, status: &MemberStatus) {
        let liveness = match status.liveness {
            Liveness::Active => status.liveness.to_string().green(),
            Liveness::Idle => status.liveness.to_string().cyan(),
            Liveness::Stale => status.liveness.to_string().yellow(),
            Liveness::Offline => status.liveness.to_string().red().bold(),
            Liveness::Inactive => status.liveness.to_string().dimmed(),
        };
        let handle = status
            .process_handle
            .as_ref()
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<14} {:<10} {:<16} {}",
            status.member_id.bold(),
            status.role_type,
            liveness,
            handle,
            status
                .last_activity
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
    }

    pub fn print_task(&self, task: &Task) {
        let status = match task.status {
            TaskStatus::Pending => task.status.to_string().yellow(),
            TaskStatus::InProgress => task.status.to_string().cyan(),
            TaskStatus::Completed => task.status.to_string().green(),
            TaskStatus::Cancelled => task.status.to_string().dimmed(),
        };
        let short_id: String = task.id.chars().take(8).collect();
        println!(
            "  {} {:<12} {:<8} {:<12} {}",
            short_id.dimmed(),
            status,
            task.priority.to_string(),
            task.owner.as_deref().unwrap_or("-"),
            task.subject
        );
        if self.verbose && !task.blocked_by.is_empty() {
            let waits: Vec<String> = task
                .blocked_by
                .iter()
                .map(|id| id.chars().take(8).collect())
                .collect();
            println!("           {} {}", "waits on".dimmed(), waits.join(", "));
        }
    }

    pub fn print_entry(&self, entry: &MailboxEntry) {
        let kind = entry.kind.to_string();
        println!(
            "  {} {} {} {}",
            entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
            entry.from.bold(),
            format!("[{kind}]").magenta(),
            entry.summary.as_deref().unwrap_or("")
        );
        for line in entry.body.lines() {
            println!("      {line}");
        }
        if let Some(request_id) = &entry.request_id {
            println!("      {} {}", "request".dimmed(), request_id);
        }
    }
}

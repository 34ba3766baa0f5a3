//! Muster CLI application
//!
//! Leader-side commands create teams, spawn members, manage the task graph
//! and run the shutdown protocol. Worker-side commands (`muster worker ...`)
//! let a spawned worker read its mailbox, answer shutdown requests and move
//! its own tasks.
//!
//! The process exits with the result code of the failing error, so scripts
//! can tell a timed-out shutdown (9) from a blocked task (5).

#![allow(clippy::too_many_arguments)]

mod args;
mod commands;
mod console;
mod router;

use anyhow::Result;
use args::Cli;
use clap::Parser;
use console::CliConsole;
use muster_core::{LoggingConfig, MusterConfig, MusterError, load_config};
use serde_json::{Value, json};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let console = CliConsole::new(cli.verbose, cli.json);

    let config = match prepare(&cli) {
        Ok(config) => config,
        Err(e) => return report_failure(&console, &e),
    };

    match router::route(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&console, &e),
    }
}

/// Load configuration and install the subscriber it describes
fn prepare(cli: &Cli) -> Result<MusterConfig> {
    let mut config = load_config(&cli.config_file)?;
    if let Some(home) = &cli.home {
        config.home_dir = Some(home.clone());
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging);
    Ok(config)
}

/// RUST_LOG wins over the configured level
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,muster_core={0},muster={0}", logging.level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if logging.is_json() {
        builder.json().try_init()
    } else if logging.format.eq_ignore_ascii_case("compact") {
        builder.compact().try_init()
    } else {
        builder.pretty().try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {e}");
    }
}

/// With `--json` the failure goes to stdout as a structured object
fn report_failure(console: &CliConsole, error: &anyhow::Error) -> ExitCode {
    let code = exit_code(error);
    if !console.emit_json(failure_json(error, code)) {
        console.error(&format!("{error:#}"));
    }
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn failure_json(error: &anyhow::Error, exit_code: i32) -> Value {
    let core = error.downcast_ref::<MusterError>();
    json!({
        "error": {
            "code": core.map_or("INTERNAL", MusterError::error_code),
            "category": core.map(|e| e.category().to_string()),
            "retryable": core.is_some_and(MusterError::is_retryable),
            "message": format!("{error:#}"),
            "exitCode": exit_code,
        }
    })
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<MusterError>()
        .map(MusterError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_follows_core_error() {
        let timed_out = anyhow::Error::from(MusterError::TimedOut {
            member: "w1".into(),
            waited: std::time::Duration::from_secs(30),
        });
        assert_eq!(exit_code(&timed_out), 9);

        let wrapped = anyhow::Error::from(MusterError::team_not_found("t1")).context("status");
        assert_eq!(exit_code(&wrapped), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn test_failure_json_carries_error_code() {
        let blocked = anyhow::Error::from(MusterError::StillBlocked {
            task: "deploy".into(),
            blockers: vec!["build".into()],
        });
        let value = failure_json(&blocked, exit_code(&blocked));
        assert_eq!(value["error"]["code"], "STILL_BLOCKED");
        assert_eq!(value["error"]["category"], "structural");
        assert_eq!(value["error"]["retryable"], true);
        assert_eq!(value["error"]["exitCode"], 5);

        let plain = anyhow::anyhow!("plain failure");
        let value = failure_json(&plain, 1);
        assert_eq!(value["error"]["code"], "INTERNAL");
        assert!(value["error"]["category"].is_null());
        assert_eq!(value["error"]["message"], "plain failure");
    }
}

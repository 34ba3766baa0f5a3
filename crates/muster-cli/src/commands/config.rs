//! Configuration management commands

use crate::console::CliConsole;
use anyhow::{Context, Result, bail};
use colored::*;
use muster_core::MusterConfig;
use std::path::Path;

/// Show the effective configuration
pub async fn show(console: &CliConsole, config_file: &Path, config: &MusterConfig) -> Result<()> {
    if console.emit_json(serde_json::to_value(config)?) {
        return Ok(());
    }

    console.print_header("Configuration");
    if config_file.exists() {
        console.success(&format!("Loaded configuration from: {}", config_file.display()));
    } else {
        console.warn(&format!(
            "Configuration file not found: {}",
            config_file.display()
        ));
        console.info("Using defaults and MUSTER_* overrides");
    }

    let home = config
        .resolve_home()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| e.to_string());
    print_row("Home", &home);
    print_row("Backend", &config.backend.to_string());
    print_row("Worker command", &config.worker_command.join(" "));
    print_row(
        "Shutdown timeout",
        &format!(
            "{}s (team-wide {}s)",
            config.timeouts.shutdown_secs, config.timeouts.team_shutdown_secs
        ),
    );
    print_row(
        "Spawn grace",
        &format!("{}ms", config.timeouts.spawn_grace_ms),
    );
    print_row(
        "Liveness",
        &format!(
            "active < {}s, idle <= {}s",
            config.liveness.active_secs, config.liveness.idle_secs
        ),
    );
    print_row(
        "Logging",
        &format!("{} ({})", config.logging.level, config.logging.format),
    );
    Ok(())
}

fn print_row(label: &str, value: &str) {
    println!("  {:<18} {}", format!("{label}:").bold(), value);
}

/// Write a configuration file holding the defaults
pub async fn init(console: &CliConsole, config_file: &Path, force: bool) -> Result<()> {
    if config_file.exists() && !force {
        console.info("Use --force to overwrite");
        bail!(
            "Configuration file already exists: {}",
            config_file.display()
        );
    }

    let text = serde_json::to_string_pretty(&MusterConfig::default())
        .context("Failed to serialize configuration")?;
    tokio::fs::write(config_file, text)
        .await
        .with_context(|| format!("Failed to write {}", config_file.display()))?;

    console.success(&format!(
        "Created configuration file: {}",
        config_file.display()
    ));
    Ok(())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon commands: `serve` and `status`

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use loom_core::domain::node_config::NodeConfigManifest;

use crate::daemon::{check_daemon_running, start_daemon, DaemonStatus};

/// Run the HTTP daemon in the foreground until Ctrl+C or SIGTERM.
pub async fn serve(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let mut config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    if let Some(port) = port {
        config.spec.server.port = port;
    }

    match check_daemon_running(&config.spec.server.bind_address, config.spec.server.port).await {
        Ok(DaemonStatus::Running { .. }) => {
            anyhow::bail!(
                "A daemon is already answering on port {}",
                config.spec.server.port
            );
        }
        Ok(_) | Err(_) => info!("Starting Loom daemon"),
    }

    start_daemon(config).await
}

pub async fn status(host: &str, port: u16) -> Result<()> {
    match check_daemon_running(host, port).await {
        Ok(DaemonStatus::Running {
            node,
            uptime,
            active_runs,
            active_swarms,
        }) => {
            println!("{}", "✓ Daemon is running".green());
            if let Some(node) = node {
                println!("  Node: {}", node);
            }
            if let Some(uptime) = uptime {
                println!("  Uptime: {}", format_duration(uptime));
            }
            println!("  Active runs: {}", active_runs);
            println!("  Active swarms: {}", active_swarms);
        }
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "✗ Daemon is not running".red());
        }
        Ok(DaemonStatus::Unhealthy { error }) => {
            println!("{}", "⚠ Daemon unhealthy".yellow());
            println!("  HTTP API check failed: {}", error);
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check status: {}", e).red());
            return Err(e);
        }
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "0m");
        assert_eq!(format_duration(3 * 3600 + 120), "3h 2m");
        assert_eq!(format_duration(2 * 86400 + 3600), "2d 1h 0m");
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Loom CLI
//!
//! The `loom` binary runs the orchestrator daemon and talks to it.
//!
//! ## Commands
//!
//! - `loom serve` - Run the HTTP daemon in the foreground
//! - `loom status` - Check whether a daemon answers
//! - `loom tool list|call` - Drive the tool gateway
//! - `loom swarm start` - Start a root swarm for a conversation
//! - `loom approval list|grant|reject` - Resolve gated tool calls
//! - `loom config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use loom_orchestrator::commands::{
    self, ApprovalCommand, ConfigCommand, SwarmCommand, ToolCommand,
};
use loom_orchestrator::daemon::client::{ClientIdentity, DaemonClient};

/// Loom - orchestration core for routine runs and multi-agent swarms
#[derive(Parser)]
#[command(name = "loom")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "LOOM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Daemon host used by client commands
    #[arg(long, global = true, env = "LOOM_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Daemon port used by client commands
    #[arg(long, global = true, env = "LOOM_CLIENT_PORT", default_value = "8080")]
    port: u16,

    /// User id forwarded to the daemon as the caller
    #[arg(long, global = true, env = "LOOM_USER_ID")]
    user: Option<String>,

    /// Forward the admin flag with the caller identity
    #[arg(long, global = true)]
    admin: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOOM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP daemon in the foreground
    Serve {
        /// Listen port (overrides spec.server.port)
        #[arg(long = "listen-port")]
        listen_port: Option<u16>,
    },

    /// Check daemon status
    Status,

    /// Tool gateway operations
    #[command(name = "tool")]
    Tool {
        #[command(subcommand)]
        command: ToolCommand,
    },

    /// Swarm operations
    #[command(name = "swarm")]
    Swarm {
        #[command(subcommand)]
        command: SwarmCommand,
    },

    /// Tool approval operations
    #[command(name = "approval")]
    Approval {
        #[command(subcommand)]
        command: ApprovalCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let client = || {
        DaemonClient::new(
            &cli.host,
            cli.port,
            ClientIdentity {
                user_id: cli.user.clone(),
                admin: cli.admin,
            },
        )
    };

    match cli.command {
        Some(Commands::Serve { listen_port }) => {
            commands::daemon::serve(cli.config.clone(), listen_port).await
        }
        Some(Commands::Status) => commands::daemon::status(&cli.host, cli.port).await,
        Some(Commands::Tool { command }) => commands::tool::handle_command(command, client()?).await,
        Some(Commands::Swarm { command }) => {
            commands::swarm::handle_command(command, client()?).await
        }
        Some(Commands::Approval { command }) => {
            commands::approval::handle_command(command, client()?).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config.clone()).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

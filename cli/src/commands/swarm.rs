// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm commands
//!
//! Commands: start

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use loom_swarm::SpawnRequest;

use crate::daemon::DaemonClient;

#[derive(Subcommand)]
pub enum SwarmCommand {
    /// Start a root swarm for a conversation
    Start {
        /// Conversation (chat) id
        #[arg(long, value_name = "ID")]
        conversation: String,

        /// What the swarm should achieve
        #[arg(long)]
        goal: String,

        #[arg(long)]
        team: Option<String>,

        /// Preferred model for the swarm's agents
        #[arg(long)]
        model: Option<String>,

        /// Initial sub-task descriptions (repeatable)
        #[arg(long = "task", value_name = "DESCRIPTION")]
        tasks: Vec<String>,
    },
}

pub async fn handle_command(command: SwarmCommand, client: DaemonClient) -> Result<()> {
    match command {
        SwarmCommand::Start {
            conversation,
            goal,
            team,
            model,
            tasks,
        } => {
            let request = SpawnRequest {
                goal,
                team_id: team,
                model_hint: model,
                initial_sub_tasks: tasks,
            };
            let outcome = client.start_swarm(&conversation, request).await?;

            println!("{}", "✓ Swarm started".green());
            println!("  Swarm ID: {}", outcome.swarm_id);
            println!("  Conversation: {}", outcome.conversation_id);
            println!("  Allocation: {}", outcome.allocation);
            if let Some(job_id) = outcome.job_id {
                println!("  Job ID: {}", job_id);
            }
            Ok(())
        }
    }
}

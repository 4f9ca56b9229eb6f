// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool approval commands
//!
//! Commands: list, grant, reject

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use uuid::Uuid;

use crate::daemon::DaemonClient;

#[derive(Subcommand)]
pub enum ApprovalCommand {
    /// List pending approval requests
    List,

    /// Let a gated tool call proceed
    Grant {
        #[arg(value_name = "APPROVAL_ID")]
        approval_id: Uuid,

        /// Conversation the request was raised in
        #[arg(long)]
        conversation: String,
    },

    /// Refuse a gated tool call
    Reject {
        #[arg(value_name = "APPROVAL_ID")]
        approval_id: Uuid,

        /// Conversation the request was raised in
        #[arg(long)]
        conversation: String,

        #[arg(short, long)]
        reason: Option<String>,
    },
}

pub async fn handle_command(command: ApprovalCommand, client: DaemonClient) -> Result<()> {
    match command {
        ApprovalCommand::List => {
            let pending = client.list_approvals().await?;
            if pending.is_empty() {
                println!("{}", "No pending approvals".dimmed());
                return Ok(());
            }
            println!("{}", "Pending approvals:".bold());
            for request in pending {
                println!(
                    "  {}  {}  requested by {} in {}",
                    request.id,
                    request.tool_name.bold(),
                    request.requested_by,
                    request.context.conversation_id
                );
                println!("    Arguments: {}", request.arguments);
            }
            Ok(())
        }
        ApprovalCommand::Grant {
            approval_id,
            conversation,
        } => {
            let response = client.grant_approval(approval_id, &conversation).await?;
            report(approval_id, &conversation, &response, "granted");
            Ok(())
        }
        ApprovalCommand::Reject {
            approval_id,
            conversation,
            reason,
        } => {
            let response = client
                .reject_approval(approval_id, &conversation, reason)
                .await?;
            report(approval_id, &conversation, &response, "rejected");
            Ok(())
        }
    }
}

fn report(approval_id: Uuid, conversation: &str, response: &Value, verb: &str) {
    if response["ignored"].as_bool().unwrap_or(false) {
        println!(
            "{}",
            format!("Approval {} does not belong to conversation {}; nothing changed", approval_id, conversation)
                .yellow()
        );
    } else {
        println!("{}", format!("✓ Approval {} {}", approval_id, verb).green());
    }
}

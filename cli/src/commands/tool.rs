// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool gateway commands
//!
//! Commands: list, call

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;

use crate::daemon::client::{CallScope, DaemonClient};

#[derive(Subcommand)]
pub enum ToolCommand {
    /// List built-in and user-defined tools
    List {
        /// Print each tool's input schema
        #[arg(long)]
        schemas: bool,
    },

    /// Call a tool through the gateway
    Call {
        /// Tool name
        #[arg(value_name = "TOOL")]
        tool: String,

        /// Arguments (JSON string or @file.json)
        #[arg(short, long, value_name = "ARGS")]
        args: Option<String>,

        /// Conversation the call belongs to
        #[arg(long)]
        conversation: Option<String>,

        /// Swarm the call is made from
        #[arg(long)]
        swarm: Option<String>,

        /// Run the call is made from
        #[arg(long)]
        run: Option<String>,
    },
}

pub async fn handle_command(command: ToolCommand, client: DaemonClient) -> Result<()> {
    match command {
        ToolCommand::List { schemas } => list(client, schemas).await,
        ToolCommand::Call {
            tool,
            args,
            conversation,
            swarm,
            run,
        } => {
            let arguments = parse_json_arg(args.as_deref())?;
            let scope = CallScope {
                conversation_id: conversation,
                swarm_id: swarm,
                run_id: run,
            };
            call(client, &tool, arguments, scope).await
        }
    }
}

async fn list(client: DaemonClient, schemas: bool) -> Result<()> {
    let tools = client.list_tools().await?;
    println!("{}", "Tools:".bold());
    for tool in tools {
        let origin = if tool.builtin { "built-in" } else { "defined" };
        println!("  {} ({})", tool.name.bold(), origin.dimmed());
        println!("    {}", tool.description);
        if schemas {
            println!(
                "    {}",
                serde_json::to_string(&tool.input_schema).unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn call(client: DaemonClient, tool: &str, arguments: Value, scope: CallScope) -> Result<()> {
    let response = client.call_tool(tool, arguments, scope).await?;
    let text = response.text_content();
    if response.is_error {
        println!("{}", format!("✗ {} failed", tool).red());
        println!("{}", text);
        anyhow::bail!("Tool call returned an error");
    }
    println!("{}", format!("✓ {}", tool).green());
    println!("{}", text);
    Ok(())
}

/// Parse an inline JSON value or `@path` to a JSON file. Absent means `{}`.
pub fn parse_json_arg(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(Value::Object(Default::default()));
    };
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read arguments file {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Arguments are not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_json_arg_inline_and_file() {
        assert_eq!(parse_json_arg(None).unwrap(), json!({}));
        assert_eq!(
            parse_json_arg(Some(r#"{"runId":"r"}"#)).unwrap(),
            json!({ "runId": "r" })
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"goal":"ship"}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(parse_json_arg(Some(&arg)).unwrap(), json!({ "goal": "ship" }));

        assert!(parse_json_arg(Some("{not json")).is_err());
    }
}

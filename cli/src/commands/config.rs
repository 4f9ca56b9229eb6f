// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use loom_core::domain::node_config::NodeConfigManifest;

pub const CONFIG_TEMPLATE: &str = include_str!("../../templates/loom-config.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./loom-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, yaml: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. LOOM_CONFIG_PATH: {}",
            std::env::var("LOOM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./loom-config.yaml");
        println!("  4. ~/.loom/config.yaml");
        println!("  5. /etc/loom/config.yaml");
        println!();
    }

    if yaml {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!(
        "  Platform admin: {}",
        spec.platform.admin_user_id.as_deref().unwrap_or("(none)")
    );
    println!();

    println!("{}", "Registries:".bold());
    println!("  Run reap grace: {:?}", spec.registry.run_reap_grace);
    println!("  Swarm reap grace: {:?}", spec.registry.swarm_reap_grace);
    println!();

    println!("{}", "Approvals:".bold());
    println!("  Default timeout: {:?}", spec.approvals.default_timeout);
    if spec.approvals.require_approval_for.is_empty() {
        println!("  Gated tools: {}", "(none)".dimmed());
    } else {
        println!("  Gated tools: {}", spec.approvals.require_approval_for.join(", "));
    }
    println!();

    println!("{}", "Allocator:".bold());
    println!("  Root budget: {} credits, {:?}", spec.allocator.root_max_credits, spec.allocator.root_max_duration);
    for (name, tier) in [
        ("basic", &spec.allocator.tiers.basic),
        ("enhanced", &spec.allocator.tiers.enhanced),
        ("rich", &spec.allocator.tiers.rich),
    ] {
        println!(
            "  {}: share {}, ceiling {} credits, model {}, parallelism {}",
            name.bold(),
            tier.share,
            tier.credit_ceiling,
            tier.model,
            tier.parallelism
        );
    }
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    if spec.metrics.enabled {
        println!("  Metrics: :{}", spec.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    std::fs::write(output, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_valid() {
        let config = NodeConfigManifest::from_yaml_str(CONFIG_TEMPLATE).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.spec.approvals.require_approval_for,
            vec!["resource_manage".to_string()]
        );
    }

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom-config.yaml");

        generate(&path, false).unwrap();
        assert!(generate(&path, false).is_err());
        generate(&path, true).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, CONFIG_TEMPLATE);
    }
}

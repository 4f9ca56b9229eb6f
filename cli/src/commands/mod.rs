// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Loom CLI

pub mod approval;
pub mod config;
pub mod daemon;
pub mod swarm;
pub mod tool;

pub use self::approval::ApprovalCommand;
pub use self::config::ConfigCommand;
pub use self::swarm::SwarmCommand;
pub use self::tool::ToolCommand;

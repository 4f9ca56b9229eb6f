// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Loom CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** HTTP daemon around the orchestrator, its client, and the
//!   command handlers behind the `loom` binary

pub mod commands;
pub mod daemon;

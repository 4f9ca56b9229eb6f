// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `loom-orchestrator-swarm` - Swarms and the Tool Gateway
//!
//! Multi-agent swarms with bounded budgets, and the gateway through which
//! agents drive runs, swarms and shared conversation state.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Swarm` aggregate, `SwarmAllocation`, `ResourceAllocator` |
//! | [`application`] | Application | `SwarmRegistry`, resolution policy, `SwarmService` |
//! | [`tools`] | Interface | `ToolOperation`, `ToolGateway`, response envelope |
//! | [`bootstrap`] | Wiring | `Orchestrator` built from a node configuration |
//!
//! ## Key Concepts
//!
//! - **Swarm**: a coordinated multi-agent execution. Root swarms get the
//!   configured root budget; children get a share of their parent's
//!   remaining budget, reserved on the parent until the child ends.
//! - **Active swarm**: when a tool call names no swarm, the caller's most
//!   recently registered live swarm is used.
//! - **Cascade stop**: ending a swarm stops its live descendants.

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod tools;

pub use bootstrap::Orchestrator;
pub use domain::*;

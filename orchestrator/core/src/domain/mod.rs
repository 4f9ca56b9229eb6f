// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: aggregates, value objects and collaborator contracts.
//!
//! Nothing in this layer performs I/O. Queue and persistence collaborators are
//! expressed as traits here and implemented in `crate::infrastructure`.

pub mod approval;
pub mod conversation;
pub mod error;
pub mod events;
pub mod identity;
pub mod node_config;
pub mod queue;
pub mod repository;
pub mod run;
pub mod swarm_context;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # loom-orchestrator-core
//!
//! Run lifecycle, concurrent registries, the conversation shared-state store,
//! tool approvals and the in-process event bus. Swarms, resource allocation
//! and the tool gateway are built on top of this crate in
//! `loom-orchestrator-swarm`.
//!
//! # Architecture
//!
//! - `domain`: aggregates and collaborator contracts, no I/O
//! - `application`: registries and stores shared across request handlers
//! - `infrastructure`: event bus, approval service, in-memory collaborators

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;

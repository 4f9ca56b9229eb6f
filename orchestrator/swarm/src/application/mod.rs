// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm application layer: the live registry and the swarm use-cases.

pub mod registry;
pub mod service;

pub use registry::{MostRecentOwnedPolicy, SwarmRecord, SwarmRegistry, SwarmResolutionPolicy};
pub use service::{
    EndSwarmError, SpawnError, SpawnOutcome, StandardSwarmService, SwarmControlError,
    SwarmService,
};

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for multi-agent coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `Swarm`, `SwarmState`, `StopMode`, `FinalState` |
//! | [`allocation`] | `SwarmAllocation`, `ResourceAllocator`, `SpawnRequest` |

pub mod allocation;
pub mod swarm;

pub use allocation::*;
pub use loom_core::domain::swarm_context::{SwarmContext, SwarmId};
pub use swarm::*;

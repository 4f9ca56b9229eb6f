// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Registry and active-swarm resolution
//!
//! [`SwarmRegistry`] is the process-wide index of live swarms. Which swarm a
//! caller is "currently in" when a tool call omits an explicit swarm id is a
//! separate, swappable [`SwarmResolutionPolicy`].

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use loom_core::application::registry::{Registry, RegistryError, RegistryRecord};
use loom_core::domain::identity::UserId;

use crate::domain::{Swarm, SwarmId, SwarmState};

pub type SwarmRecord = RegistryRecord<SwarmId, SwarmState>;

/// Picks the active swarm for a caller from the registry's ordered records.
pub trait SwarmResolutionPolicy: Send + Sync {
    fn resolve(&self, records: &[SwarmRecord], user: &UserId) -> Option<SwarmId>;
}

/// The most recently registered non-terminal swarm owned by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostRecentOwnedPolicy;

impl SwarmResolutionPolicy for MostRecentOwnedPolicy {
    fn resolve(&self, records: &[SwarmRecord], user: &UserId) -> Option<SwarmId> {
        records
            .iter()
            .rev()
            .find(|record| !record.terminal && &record.owner == user)
            .map(|record| record.id)
    }
}

pub struct SwarmRegistry {
    swarms: Arc<Registry<Swarm>>,
    reap_grace: Duration,
}

impl SwarmRegistry {
    pub fn new(reap_grace: Duration) -> Self {
        Self {
            swarms: Arc::new(Registry::new("swarm", "loom_swarms_registered")),
            reap_grace,
        }
    }

    pub fn register(&self, swarm: Swarm) -> Result<SwarmRecord, RegistryError> {
        let record = self.swarms.register(swarm)?;
        info!(swarm_id = %record.id, owner = %record.owner, "Swarm registered");
        Ok(record)
    }

    /// Snapshot of a live swarm; `None` if absent or already reaped.
    pub async fn get(&self, id: &SwarmId) -> Option<Swarm> {
        self.swarms.get(id).await
    }

    pub fn get_ordered_records(&self) -> Vec<SwarmRecord> {
        self.swarms.ordered_records()
    }

    pub fn record(&self, id: &SwarmId) -> Option<SwarmRecord> {
        self.swarms.record(id)
    }

    /// Run `f` with the swarm locked. `None` if the swarm is not registered.
    pub async fn with_swarm<R>(&self, id: &SwarmId, f: impl FnOnce(&mut Swarm) -> R) -> Option<R> {
        self.swarms.with_instance(id, f).await
    }

    pub fn deregister(&self, id: &SwarmId) -> bool {
        self.swarms.deregister(id)
    }

    /// Deregister a terminal swarm once the grace period has passed.
    pub fn schedule_reap(&self, id: SwarmId) {
        self.swarms.schedule_reap(id, self.reap_grace);
    }

    pub fn len(&self) -> usize {
        self.swarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swarms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(owner: &str, sequence: u64, terminal: bool) -> SwarmRecord {
        RegistryRecord {
            id: SwarmId::new(),
            owner: UserId::new(owner),
            created_at: Utc::now(),
            sequence,
            status: if terminal {
                SwarmState::Stopped
            } else {
                SwarmState::Running
            },
            terminal,
        }
    }

    #[test]
    fn test_most_recent_owned_wins() {
        let records = vec![
            record("alice", 0, false),
            record("alice", 1, false),
            record("bob", 2, false),
            record("alice", 3, true),
        ];
        let resolved = MostRecentOwnedPolicy.resolve(&records, &UserId::new("alice"));
        assert_eq!(resolved, Some(records[1].id));
    }

    #[test]
    fn test_no_owned_active_swarm() {
        let records = vec![record("bob", 0, false), record("alice", 1, true)];
        assert_eq!(
            MostRecentOwnedPolicy.resolve(&records, &UserId::new("alice")),
            None
        );
    }
}

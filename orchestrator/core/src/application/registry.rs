// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Live Instance Registry
//!
//! Arena + index for long-lived state machines (runs, swarms). The registry is
//! the only owner of an instance; callers hold identifiers and resolve them on
//! every access.
//!
//! ## Locking
//!
//! - Slots live in a sharded [`DashMap`], so single-key operations never take a
//!   registry-wide lock.
//! - Each instance sits behind its own `tokio::sync::Mutex`. Mutations go
//!   through [`Registry::with_instance`], which serialises transitions per
//!   instance and refreshes the slot's index record afterwards.
//! - Map guards are never held across an `.await`.
//!
//! ## Ordering
//!
//! Every registration takes a monotonically increasing sequence number.
//! [`Registry::ordered_records`] enumerates in that order; "most recent active
//! instance for a user" resolution depends on it.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::error::{Classify, ErrorKind};
use crate::domain::identity::UserId;

/// A state machine that can live in a [`Registry`].
pub trait Managed: Send + 'static {
    type Id: Copy + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;
    type Status: Copy + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
    fn owner(&self) -> &UserId;
    fn status(&self) -> Self::Status;
    fn is_terminal(&self) -> bool;
    fn created_at(&self) -> DateTime<Utc>;
}

/// Index entry kept next to each instance. Readable without locking the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRecord<I, S> {
    pub id: I,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
    pub status: S,
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} {id} is already registered")]
    AlreadyRegistered { kind: &'static str, id: String },
}

impl Classify for RegistryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidState
    }
}

type RecordOf<M> = RegistryRecord<<M as Managed>::Id, <M as Managed>::Status>;

struct Slot<M: Managed> {
    record: RecordOf<M>,
    instance: Arc<Mutex<M>>,
}

pub struct Registry<M: Managed> {
    slots: DashMap<M::Id, Slot<M>>,
    sequence: AtomicU64,
    kind: &'static str,
    gauge: &'static str,
}

impl<M: Managed> Registry<M> {
    /// `kind` names the instances in errors and logs; `gauge` is the metric
    /// tracking the number of live registrations.
    pub fn new(kind: &'static str, gauge: &'static str) -> Self {
        Self {
            slots: DashMap::new(),
            sequence: AtomicU64::new(0),
            kind,
            gauge,
        }
    }

    pub fn register(&self, instance: M) -> Result<RecordOf<M>, RegistryError> {
        let id = instance.id();
        let record = match self.slots.entry(id) {
            Entry::Occupied(_) => {
                return Err(RegistryError::AlreadyRegistered {
                    kind: self.kind,
                    id: id.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let record = RegistryRecord {
                    id,
                    owner: instance.owner().clone(),
                    created_at: instance.created_at(),
                    sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
                    status: instance.status(),
                    terminal: instance.is_terminal(),
                };
                vacant.insert(Slot {
                    record: record.clone(),
                    instance: Arc::new(Mutex::new(instance)),
                });
                record
            }
        };
        debug!(kind = self.kind, id = %id, "Registered instance");
        self.report_size();
        Ok(record)
    }

    pub fn contains(&self, id: &M::Id) -> bool {
        self.slots.contains_key(id)
    }

    pub fn record(&self, id: &M::Id) -> Option<RecordOf<M>> {
        self.slots.get(id).map(|slot| slot.record.clone())
    }

    /// All index records in registration order.
    pub fn ordered_records(&self) -> Vec<RecordOf<M>> {
        let mut records: Vec<_> = self.slots.iter().map(|slot| slot.record.clone()).collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    /// Run `f` against the live instance while holding its lock.
    ///
    /// Returns `None` when the id is unknown or was deregistered while waiting
    /// for the lock.
    pub async fn with_instance<R>(&self, id: &M::Id, f: impl FnOnce(&mut M) -> R) -> Option<R> {
        let instance = self.slots.get(id).map(|slot| slot.instance.clone())?;
        let mut guard = instance.lock().await;

        let still_registered = self
            .slots
            .get(id)
            .is_some_and(|slot| Arc::ptr_eq(&slot.instance, &instance));
        if !still_registered {
            return None;
        }

        let result = f(&mut guard);
        if let Some(mut slot) = self.slots.get_mut(id) {
            if Arc::ptr_eq(&slot.instance, &instance) {
                slot.record.status = guard.status();
                slot.record.terminal = guard.is_terminal();
            }
        }
        Some(result)
    }

    pub fn deregister(&self, id: &M::Id) -> bool {
        let removed = self.slots.remove(id).is_some();
        if removed {
            debug!(kind = self.kind, id = %id, "Deregistered instance");
            self.report_size();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Deregister `id` after `grace`, provided it is still terminal by then.
    pub fn schedule_reap(self: &Arc<Self>, id: M::Id, grace: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let terminal = registry
                .slots
                .get(&id)
                .map(|slot| slot.record.terminal)
                .unwrap_or(false);
            if terminal {
                registry.deregister(&id);
            }
        });
    }

    fn report_size(&self) {
        metrics::gauge!(self.gauge).set(self.slots.len() as f64);
    }
}

impl<M: Managed + Clone> Registry<M> {
    /// Snapshot of the live instance, or `None` if absent or already reaped.
    pub async fn get(&self, id: &M::Id) -> Option<M> {
        self.with_instance(id, |instance| instance.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct Counter {
        id: Uuid,
        owner: UserId,
        value: u32,
        created_at: DateTime<Utc>,
    }

    impl Counter {
        fn new(owner: &str) -> Self {
            Self {
                id: Uuid::new_v4(),
                owner: UserId::new(owner),
                value: 0,
                created_at: Utc::now(),
            }
        }
    }

    impl Managed for Counter {
        type Id = Uuid;
        type Status = u32;

        fn id(&self) -> Uuid {
            self.id
        }
        fn owner(&self) -> &UserId {
            &self.owner
        }
        fn status(&self) -> u32 {
            self.value
        }
        fn is_terminal(&self) -> bool {
            self.value >= 3
        }
        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }
    }

    fn registry() -> Arc<Registry<Counter>> {
        Arc::new(Registry::new("counter", "test_counters_registered"))
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_id() {
        let registry = registry();
        let counter = Counter::new("alice");
        registry.register(counter.clone()).unwrap();
        let err = registry.register(counter).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_after_deregister_is_none() {
        let registry = registry();
        let counter = Counter::new("alice");
        let id = counter.id;
        registry.register(counter).unwrap();
        assert!(registry.get(&id).await.is_some());
        assert!(registry.deregister(&id));
        assert!(registry.get(&id).await.is_none());
        assert!(registry.with_instance(&id, |c| c.value += 1).await.is_none());
    }

    #[tokio::test]
    async fn test_ordered_records_follow_registration() {
        let registry = registry();
        let ids: Vec<_> = (0..5)
            .map(|_| {
                let counter = Counter::new("alice");
                let id = counter.id;
                registry.register(counter).unwrap();
                id
            })
            .collect();
        let ordered: Vec<_> = registry.ordered_records().into_iter().map(|r| r.id).collect();
        assert_eq!(ordered, ids);
    }

    #[tokio::test]
    async fn test_with_instance_refreshes_record() {
        let registry = registry();
        let counter = Counter::new("alice");
        let id = counter.id;
        registry.register(counter).unwrap();

        registry.with_instance(&id, |c| c.value = 3).await.unwrap();
        let record = registry.record(&id).unwrap();
        assert_eq!(record.status, 3);
        assert!(record.terminal);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_serialised() {
        let registry = registry();
        let counter = Counter::new("alice");
        let id = counter.id;
        registry.register(counter).unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .with_instance(&id, |c| {
                        let next = c.value + 1;
                        c.value = next;
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(registry.get(&id).await.unwrap().value, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_only_terminal_instances() {
        let registry = registry();
        let live = Counter::new("alice");
        let mut done = Counter::new("alice");
        done.value = 3;
        let (live_id, done_id) = (live.id, done.id);
        registry.register(live).unwrap();
        registry.register(done).unwrap();

        registry.schedule_reap(live_id, Duration::from_secs(1));
        registry.schedule_reap(done_id, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(registry.contains(&live_id));
        assert!(!registry.contains(&done_id));
    }
}

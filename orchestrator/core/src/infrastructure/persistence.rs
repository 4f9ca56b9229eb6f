// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory [`PersistenceService`] used by the single-node daemon and tests.
//!
//! `fail_with` makes every subsequent call return a backend error until
//! `recover` is called, so upstream-failure paths can be exercised.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::repository::{
    merge_patch, PersistenceError, PersistenceService, ResourceKind, StoredRecord,
};

#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    records: Arc<RwLock<BTreeMap<(ResourceKind, String), StoredRecord>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check(&self) -> Result<(), PersistenceError> {
        match self.failure.read().as_ref() {
            Some(message) => Err(PersistenceError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

fn matches_filter(data: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| data.get(key) == Some(expected))
}

#[async_trait]
impl PersistenceService for InMemoryPersistence {
    async fn create(
        &self,
        kind: ResourceKind,
        id: &str,
        data: Value,
    ) -> Result<StoredRecord, PersistenceError> {
        self.check()?;
        let mut records = self.records.write();
        let key = (kind, id.to_string());
        if records.contains_key(&key) {
            return Err(PersistenceError::Conflict {
                kind,
                id: id.to_string(),
            });
        }
        let now = Utc::now();
        let record = StoredRecord {
            id: id.to_string(),
            kind,
            data,
            created_at: now,
            updated_at: now,
        };
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn read(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<StoredRecord>, PersistenceError> {
        self.check()?;
        Ok(self.records.read().get(&(kind, id.to_string())).cloned())
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        patch: Value,
    ) -> Result<StoredRecord, PersistenceError> {
        self.check()?;
        let mut records = self.records.write();
        let record = records
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| PersistenceError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        merge_patch(&mut record.data, &patch);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn put(
        &self,
        kind: ResourceKind,
        id: &str,
        data: Value,
    ) -> Result<StoredRecord, PersistenceError> {
        self.check()?;
        let mut records = self.records.write();
        let now = Utc::now();
        let record = records
            .entry((kind, id.to_string()))
            .and_modify(|existing| {
                existing.data = data.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| StoredRecord {
                id: id.to_string(),
                kind,
                data: data.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), PersistenceError> {
        self.check()?;
        match self.records.write().remove(&(kind, id.to_string())) {
            Some(_) => Ok(()),
            None => Err(PersistenceError::NotFound {
                kind,
                id: id.to_string(),
            }),
        }
    }

    async fn find(
        &self,
        kind: ResourceKind,
        filter: &Map<String, Value>,
    ) -> Result<Vec<StoredRecord>, PersistenceError> {
        self.check()?;
        let records = self.records.read();
        let mut found: Vec<_> = records
            .values()
            .filter(|r| r.kind == kind && matches_filter(&r.data, filter))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }
}

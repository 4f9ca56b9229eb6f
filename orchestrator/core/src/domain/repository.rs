// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Persistence Contract
//!
//! The orchestrator does not own a database. Every durable object (chats,
//! messages, teams, notes, tool definitions) is read and written through the
//! generic [`PersistenceService`] collaborator.
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | `create` | insert; `Conflict` if the id already exists |
//! | `read` | fetch by kind + id |
//! | `update` | JSON merge patch (RFC 7386) onto `data`; `NotFound` if absent |
//! | `put` | insert or replace |
//! | `delete` | remove; `NotFound` if absent |
//! | `find` | every record of a kind whose `data` contains all filter pairs |
//!
//! The in-memory implementation lives in `crate::infrastructure::persistence`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::{Classify, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Chat,
    ChatMessage,
    Team,
    Note,
    Project,
    Routine,
    Standard,
    ToolDefinition,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ChatMessage => "chat_message",
            Self::Team => "team",
            Self::Note => "note",
            Self::Project => "project",
            Self::Routine => "routine",
            Self::Standard => "standard",
            Self::ToolDefinition => "tool_definition",
        }
    }

    /// Kinds agents may manage directly through `resource_manage`.
    pub fn is_user_manageable(&self) -> bool {
        matches!(
            self,
            Self::Note | Self::Project | Self::Routine | Self::Standard
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "chat_message" => Ok(Self::ChatMessage),
            "team" => Ok(Self::Team),
            "note" => Ok(Self::Note),
            "project" => Ok(Self::Project),
            "routine" => Ok(Self::Routine),
            "standard" => Ok(Self::Standard),
            "tool_definition" => Ok(Self::ToolDefinition),
            other => Err(format!("unknown resource kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub kind: ResourceKind,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// String field of `data`, used for owner and membership checks.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("{kind} {id} already exists")]
    Conflict { kind: ResourceKind, id: String },

    #[error("Persistence backend error: {0}")]
    Backend(String),
}

impl Classify for PersistenceError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::InvalidState,
            Self::Backend(_) => ErrorKind::UpstreamFailure,
        }
    }
}

#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn create(
        &self,
        kind: ResourceKind,
        id: &str,
        data: Value,
    ) -> Result<StoredRecord, PersistenceError>;

    async fn read(&self, kind: ResourceKind, id: &str)
        -> Result<Option<StoredRecord>, PersistenceError>;

    /// Merge-patch `patch` onto the stored data.
    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        patch: Value,
    ) -> Result<StoredRecord, PersistenceError>;

    async fn put(
        &self,
        kind: ResourceKind,
        id: &str,
        data: Value,
    ) -> Result<StoredRecord, PersistenceError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), PersistenceError>;

    async fn find(
        &self,
        kind: ResourceKind,
        filter: &Map<String, Value>,
    ) -> Result<Vec<StoredRecord>, PersistenceError>;
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target_map) = target {
                for (key, value) in patch_map {
                    if value.is_null() {
                        target_map.remove(key);
                    } else {
                        merge_patch(
                            target_map.entry(key.clone()).or_insert(Value::Null),
                            value,
                        );
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_nested() {
        let mut target = json!({"a": {"b": 1, "c": 2}, "d": [1, 2]});
        merge_patch(&mut target, &json!({"a": {"b": null, "e": 3}, "d": [3]}));
        assert_eq!(target, json!({"a": {"c": 2, "e": 3}, "d": [3]}));
    }

    #[test]
    fn test_merge_patch_replaces_scalars() {
        let mut target = json!("old");
        merge_patch(&mut target, &json!({"k": "v"}));
        assert_eq!(target, json!({"k": "v"}));
    }

    #[test]
    fn test_resource_kind_round_trips_through_str() {
        for kind in [ResourceKind::Note, ResourceKind::ToolDefinition, ResourceKind::ChatMessage] {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
        assert!(ResourceKind::Note.is_user_manageable());
        assert!(!ResourceKind::Team.is_user_manageable());
    }
}

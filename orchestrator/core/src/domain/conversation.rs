// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conversation Shared State
//!
//! The blackboard shared by every agent working inside one conversation. The
//! configuration is split into three independent facets:
//!
//! | Facet | Type | Written by |
//! |-------|------|-----------|
//! | `subTasks` | ordered `Vec<SubTask>` | any agent in the swarm |
//! | `sharedScratchpad` | open key → value map | any agent in the swarm |
//! | `teamConfig` | [`TeamConfig`] | authorised team members only |
//!
//! ## Invariants
//!
//! - A [`SharedStateUpdate`] targets exactly one facet.
//! - Each facet carries its own version, bumped on every successful update. An
//!   update carrying a stale `expected_version` is rejected.
//! - A failed update never touches the other two facets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::domain::error::{Classify, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
    Failed,
    Canceled,
}

impl SubTaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: String,
    pub status: SubTaskStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Free-form blackboard. Writing `null` to a key removes it.
pub type Scratchpad = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRole {
    pub name: String,
    #[serde(default)]
    pub responsibilities: Option<String>,
}

/// Team settings. Serialised with explicit `null`s so a stored copy is fully
/// replaced rather than merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default)]
    pub max_parallel_agents: Option<u32>,
    #[serde(default)]
    pub roles: Vec<TeamRole>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetVersions {
    pub sub_tasks: u64,
    pub shared_scratchpad: u64,
    pub team_config: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    #[serde(default)]
    pub sub_tasks: Vec<SubTask>,
    #[serde(default)]
    pub shared_scratchpad: Scratchpad,
    #[serde(default)]
    pub team_config: Option<TeamConfig>,
    #[serde(default)]
    pub versions: FacetVersions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    /// `None` marks a malformed conversation record.
    pub config: Option<ConversationConfig>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId, config: ConversationConfig) -> Self {
        Self {
            conversation_id,
            config: Some(config),
            updated_at: Utc::now(),
        }
    }

    pub fn without_config(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            config: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Facet {
    SubTasks,
    SharedScratchpad,
    TeamConfig,
}

impl Facet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubTasks => "subTasks",
            Self::SharedScratchpad => "sharedScratchpad",
            Self::TeamConfig => "teamConfig",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One facet update.
#[derive(Debug, Clone, PartialEq)]
pub enum SharedStateUpdate {
    /// Upsert by id (order preserved, new ids appended) and remove by id.
    SubTasks { upsert: Vec<SubTask>, remove: Vec<String> },
    /// Set keys (`null` removes) and remove keys.
    Scratchpad { set: Scratchpad, remove: Vec<String> },
    /// Replace the team configuration.
    TeamConfig(TeamConfig),
}

impl SharedStateUpdate {
    pub fn facet(&self) -> Facet {
        match self {
            Self::SubTasks { .. } => Facet::SubTasks,
            Self::Scratchpad { .. } => Facet::SharedScratchpad,
            Self::TeamConfig(_) => Facet::TeamConfig,
        }
    }
}

/// Outcome of a facet update. Only the facet that changed is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedStateUpdateResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_sub_tasks: Option<Vec<SubTask>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_shared_scratchpad: Option<Scratchpad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_team_config: Option<TeamConfig>,
    pub facet: Facet,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationStateError {
    #[error("no shared state exists for conversation {0}")]
    NotFound(ConversationId),
    #[error("conversation {0} has no configuration")]
    ConfigNotFound(ConversationId),
    #[error("updating the team configuration requires a signed-in user")]
    SessionUserRequired,
    #[error("team {team} not found or access denied")]
    TeamNotFoundOrAccessDenied { team: String },
    #[error("stale update to {facet}: expected version {expected}, current version is {actual}")]
    Stale {
        facet: Facet,
        expected: u64,
        actual: u64,
    },
    #[error("invalid shared state update: {0}")]
    InvalidUpdate(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ConversationStateError {
    /// Stable machine-readable code surfaced to tool callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CONVERSATION_STATE_NOT_FOUND",
            Self::ConfigNotFound(_) => "CONVERSATION_CONFIG_NOT_FOUND",
            Self::SessionUserRequired => "SESSION_USER_REQUIRED",
            Self::TeamNotFoundOrAccessDenied { .. } => "TEAM_NOT_FOUND_OR_ACCESS_DENIED",
            Self::Stale { .. } => "STALE_SHARED_STATE",
            Self::InvalidUpdate(_) => "INVALID_SHARED_STATE_UPDATE",
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }
}

impl Classify for ConversationStateError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::ConfigNotFound(_) => ErrorKind::NotFound,
            Self::SessionUserRequired | Self::TeamNotFoundOrAccessDenied { .. } => {
                ErrorKind::Unauthorized
            }
            Self::Stale { .. } => ErrorKind::InvalidState,
            Self::InvalidUpdate(_) => ErrorKind::Validation,
            Self::Persistence(_) => ErrorKind::UpstreamFailure,
        }
    }
}

/// Apply a sub-task upsert/remove to the current list.
pub fn apply_sub_tasks(
    current: &[SubTask],
    upsert: &[SubTask],
    remove: &[String],
) -> Result<Vec<SubTask>, ConversationStateError> {
    for task in upsert {
        if task.id.trim().is_empty() {
            return Err(ConversationStateError::InvalidUpdate(
                "subTasks entries require a non-empty id".to_string(),
            ));
        }
        if task.description.trim().is_empty() {
            return Err(ConversationStateError::InvalidUpdate(format!(
                "subTask {} requires a non-empty description",
                task.id
            )));
        }
        if remove.contains(&task.id) {
            return Err(ConversationStateError::InvalidUpdate(format!(
                "subTask {} is both updated and removed",
                task.id
            )));
        }
    }

    let mut next: Vec<SubTask> = current
        .iter()
        .filter(|task| !remove.contains(&task.id))
        .cloned()
        .collect();

    for task in upsert {
        match next.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => next.push(task.clone()),
        }
    }
    Ok(next)
}

/// Apply a scratchpad set/remove to the current map.
pub fn apply_scratchpad(current: &Scratchpad, set: &Scratchpad, remove: &[String]) -> Scratchpad {
    let mut next = current.clone();
    for key in remove {
        next.remove(key);
    }
    for (key, value) in set {
        if value.is_null() {
            next.remove(key);
        } else {
            next.insert(key.clone(), value.clone());
        }
    }
    next
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool approval requests.
//!
//! A [`ToolApprovalRequest`] is created when a tool call needs human confirmation.
//! Its status moves `pending → granted | rejected | timed_out` exactly once; a
//! resolved request is never reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::conversation::ConversationId;
use crate::domain::error::{Classify, ErrorKind};
use crate::domain::identity::UserId;
use crate::domain::run::RunId;
use crate::domain::swarm_context::SwarmId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(pub Uuid);

impl ApprovalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the gated tool call came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalContext {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub run_id: Option<RunId>,
    #[serde(default)]
    pub swarm_id: Option<SwarmId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolApprovalRequest {
    pub id: ApprovalId,
    pub context: ApprovalContext,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub requested_by: UserId,
    pub created_at: DateTime<Utc>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Granted {
        by: Option<UserId>,
        at: DateTime<Utc>,
    },
    Rejected {
        by: Option<UserId>,
        reason: String,
        at: DateTime<Utc>,
    },
    TimedOut {
        at: DateTime<Utc>,
    },
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted { .. } => "granted",
            Self::Rejected { .. } => "rejected",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// A human decision delivered to the approval service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Grant { by: Option<UserId> },
    Reject { by: Option<UserId>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("approval request {0} not found")]
    NotFound(ApprovalId),
    #[error("approval request {id} was already resolved ({status})")]
    AlreadyResolved { id: ApprovalId, status: &'static str },
}

impl Classify for ApprovalError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyResolved { .. } => ErrorKind::InvalidState,
        }
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task queue contract.
//!
//! Runs and swarms are executed by workers behind an external queue. The
//! orchestrator only submits a descriptor and reads back an acknowledgement;
//! a rejected acknowledgement is an expected outcome, not a transport error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::identity::UserId;
use crate::domain::run::RunId;
use crate::domain::swarm_context::SwarmId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Run,
    Swarm,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => f.write_str("run"),
            Self::Swarm => f.write_str("swarm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    pub kind: JobKind,
    pub entity_id: String,
    pub user_id: UserId,
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl JobDescriptor {
    pub fn run(run_id: RunId, user_id: UserId, payload: serde_json::Value) -> Self {
        Self {
            kind: JobKind::Run,
            entity_id: run_id.to_string(),
            user_id,
            payload,
            submitted_at: Utc::now(),
        }
    }

    pub fn swarm(swarm_id: SwarmId, user_id: UserId, payload: serde_json::Value) -> Self {
        Self {
            kind: JobKind::Swarm,
            entity_id: swarm_id.to_string(),
            user_id,
            payload,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueAck {
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            success: true,
            job_id: Some(job_id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            job_id: None,
            error: Some(error.into()),
        }
    }

    /// Error text of a rejected acknowledgement, with a fallback for queues that
    /// reject without a message.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown queue error")
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, job: JobDescriptor) -> QueueAck;
}

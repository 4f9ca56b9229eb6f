// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Run Aggregate
//!
//! A [`Run`] is one execution of a routine version. It is a small state machine:
//!
//! ```text
//! queued ──▶ running ──▶ paused ──▶ stopped
//!    │          │  └──────────────▶ completed
//!    │          └─────────────────▶ stopped | failed
//!    └────────────────────────────▶ stopped | failed
//! ```
//!
//! ## Invariants
//!
//! - `pause` is only legal from `running`.
//! - `stop` is legal from every non-terminal state and records its reason.
//!   Stopping an already stopped run is rejected with [`RunError::AlreadyStopped`].
//! - `resume` is intentionally unsupported and always fails with
//!   [`RunError::NotImplemented`].
//! - Every successful transition returns a [`RunTransition`]; the run registry
//!   publishes it and refreshes its ordered index from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::conversation::ConversationId;
use crate::domain::error::{Classify, ErrorKind};
use crate::domain::identity::UserId;
use crate::domain::swarm_context::{SwarmContext, SwarmId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Standalone,
    SwarmIntegrated,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => f.write_str("standalone"),
            Self::SwarmIntegrated => f.write_str("swarm-integrated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource consumption counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUsage {
    pub credits_used: u64,
    pub steps_completed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTransition {
    pub run_id: RunId,
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("cannot {operation} run {run_id} while it is {state}")]
    InvalidState {
        run_id: RunId,
        operation: &'static str,
        state: RunState,
    },
    #[error("run {run_id} is already stopped")]
    AlreadyStopped { run_id: RunId },
    #[error("{operation} is not implemented for runs (run {run_id})")]
    NotImplemented {
        run_id: RunId,
        operation: &'static str,
    },
}

impl Classify for RunError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState { .. } | Self::AlreadyStopped { .. } => ErrorKind::InvalidState,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub routine_version_id: String,
    pub mode: RunMode,
    pub user_id: UserId,
    state: RunState,
    step_cursor: u32,
    usage: RunUsage,
    pub swarm_context: Option<SwarmContext>,
    pub conversation_id: Option<ConversationId>,
    pub inputs: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    stop_reason: Option<String>,
    failure: Option<String>,
}

impl Run {
    /// Create a queued run. The mode follows from whether a swarm context is given.
    pub fn new(
        routine_version_id: impl Into<String>,
        user_id: UserId,
        swarm_context: Option<SwarmContext>,
        conversation_id: Option<ConversationId>,
        inputs: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        let mode = if swarm_context.is_some() {
            RunMode::SwarmIntegrated
        } else {
            RunMode::Standalone
        };
        Self {
            id: RunId::new(),
            routine_version_id: routine_version_id.into(),
            mode,
            user_id,
            state: RunState::Queued,
            step_cursor: 0,
            usage: RunUsage::default(),
            swarm_context,
            conversation_id,
            inputs,
            created_at: now,
            updated_at: now,
            ended_at: None,
            stop_reason: None,
            failure: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn step_cursor(&self) -> u32 {
        self.step_cursor
    }

    pub fn usage(&self) -> &RunUsage {
        &self.usage
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn swarm_id(&self) -> Option<SwarmId> {
        self.swarm_context.map(|ctx| ctx.swarm_id)
    }

    pub fn parent_swarm_id(&self) -> Option<SwarmId> {
        self.swarm_context.and_then(|ctx| ctx.parent_swarm_id)
    }

    /// Queue acknowledged the run: `queued → running`.
    pub fn start(&mut self) -> Result<RunTransition, RunError> {
        match self.state {
            RunState::Queued => Ok(self.transition(RunState::Running)),
            state => Err(self.invalid("start", state)),
        }
    }

    pub fn pause(&mut self) -> Result<RunTransition, RunError> {
        match self.state {
            RunState::Running => Ok(self.transition(RunState::Paused)),
            state => Err(self.invalid("pause", state)),
        }
    }

    pub fn resume(&mut self) -> Result<RunTransition, RunError> {
        Err(RunError::NotImplemented {
            run_id: self.id,
            operation: "resume",
        })
    }

    pub fn stop(&mut self, reason: impl Into<String>) -> Result<RunTransition, RunError> {
        match self.state {
            RunState::Stopped => Err(RunError::AlreadyStopped { run_id: self.id }),
            state if state.is_terminal() => Err(self.invalid("stop", state)),
            _ => {
                self.stop_reason = Some(reason.into());
                Ok(self.transition(RunState::Stopped))
            }
        }
    }

    pub fn complete(&mut self) -> Result<RunTransition, RunError> {
        match self.state {
            RunState::Running => Ok(self.transition(RunState::Completed)),
            state => Err(self.invalid("complete", state)),
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<RunTransition, RunError> {
        match self.state {
            state if state.is_terminal() => Err(self.invalid("fail", state)),
            _ => {
                self.failure = Some(message.into());
                Ok(self.transition(RunState::Failed))
            }
        }
    }

    /// Advance the step cursor and charge credits. Returns the new cursor.
    pub fn record_step(&mut self, credits: u64) -> Result<u32, RunError> {
        if self.state != RunState::Running {
            return Err(self.invalid("record a step for", self.state));
        }
        self.step_cursor += 1;
        self.usage.steps_completed += 1;
        self.usage.credits_used = self.usage.credits_used.saturating_add(credits);
        self.updated_at = Utc::now();
        Ok(self.step_cursor)
    }

    fn transition(&mut self, to: RunState) -> RunTransition {
        let at = Utc::now();
        let from = self.state;
        self.state = to;
        self.updated_at = at;
        if to.is_terminal() {
            self.ended_at = Some(at);
        }
        RunTransition {
            run_id: self.id,
            from,
            to,
            at,
        }
    }

    fn invalid(&self, operation: &'static str, state: RunState) -> RunError {
        RunError::InvalidState {
            run_id: self.id,
            operation,
            state,
        }
    }
}

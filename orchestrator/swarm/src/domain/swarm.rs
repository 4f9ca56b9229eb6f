// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Aggregate
//!
//! A [`Swarm`] is a coordinated multi-agent execution with a bounded budget.
//! Root swarms are started directly; child swarms are spawned from a running
//! parent, which reserves the child's credits until the child ends.
//!
//! ```text
//! queued ──▶ running ──▶ stopped
//!    │          └──────▶ failed
//!    └─────────────────▶ stopped | failed
//! ```
//!
//! ## Invariants
//!
//! - `credits_used + reserved_credits` never exceeds `allocation.max_credits`
//!   through a reservation. A tool call that pushes usage past the limit fails
//!   the swarm with [`SwarmError::BudgetExceeded`].
//! - `stop` is idempotent: once stopped, every further `stop` returns the
//!   stored [`FinalState`] without side effects.
//! - Only graceful termination is honoured. A `force` request is accepted and
//!   recorded in `requested_mode`, the applied `mode` is `graceful` and `note`
//!   says so.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use loom_core::application::registry::Managed;
use loom_core::domain::conversation::ConversationId;
use loom_core::domain::error::{Classify, ErrorKind};
use loom_core::domain::identity::UserId;
use loom_core::domain::swarm_context::SwarmId;

use crate::domain::allocation::{ParentBudget, SwarmAllocation};

pub const FORCE_DEGRADED_NOTE: &str =
    "force termination is not supported; the swarm was stopped gracefully and running agents finish their current step";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmState {
    Queued,
    Running,
    Stopped,
    Failed,
}

impl SwarmState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SwarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    #[default]
    Graceful,
    Force,
}

impl StopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for StopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmSummary {
    pub sub_tasks_total: u32,
    pub sub_tasks_completed: u32,
    pub tool_calls: u64,
    pub credits_used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalState {
    pub ended_at: DateTime<Utc>,
    /// Mode actually applied.
    pub mode: StopMode,
    pub requested_mode: StopMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub reason: String,
    pub totals: SwarmSummary,
    pub duration_ms: u64,
    pub children: Vec<SwarmId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwarmError {
    #[error("cannot {operation} swarm {swarm_id} while it is {state}")]
    InvalidState {
        swarm_id: SwarmId,
        operation: &'static str,
        state: SwarmState,
    },

    #[error("swarm {swarm_id} budget exceeded: {requested} credits requested, {available} available")]
    BudgetExceeded {
        swarm_id: SwarmId,
        requested: u64,
        available: u64,
    },
}

impl Classify for SwarmError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidState
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swarm {
    pub id: SwarmId,
    user_id: UserId,
    pub parent_swarm_id: Option<SwarmId>,
    pub conversation_id: ConversationId,
    pub goal: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    allocation: SwarmAllocation,
    state: SwarmState,
    summary: SwarmSummary,
    reserved_credits: u64,
    children: Vec<SwarmId>,
    final_state: Option<FinalState>,
    failure: Option<String>,
}

impl Swarm {
    pub fn new_root(
        user_id: UserId,
        conversation_id: ConversationId,
        goal: impl Into<String>,
        allocation: SwarmAllocation,
    ) -> Self {
        Self::build(user_id, None, conversation_id, goal.into(), allocation)
    }

    pub fn new_child(
        parent: &Swarm,
        goal: impl Into<String>,
        allocation: SwarmAllocation,
    ) -> Self {
        Self::build(
            parent.user_id.clone(),
            Some(parent.id),
            parent.conversation_id.clone(),
            goal.into(),
            allocation,
        )
    }

    fn build(
        user_id: UserId,
        parent_swarm_id: Option<SwarmId>,
        conversation_id: ConversationId,
        goal: String,
        allocation: SwarmAllocation,
    ) -> Self {
        Self {
            id: SwarmId::new(),
            user_id,
            parent_swarm_id,
            conversation_id,
            goal,
            created_at: Utc::now(),
            started_at: None,
            allocation,
            state: SwarmState::Queued,
            summary: SwarmSummary::default(),
            reserved_credits: 0,
            children: Vec::new(),
            final_state: None,
            failure: None,
        }
    }

    /// The identity authorization checks compare against.
    pub fn associated_user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_swarm_id.is_none()
    }

    pub fn state(&self) -> SwarmState {
        self.state
    }

    pub fn allocation(&self) -> &SwarmAllocation {
        &self.allocation
    }

    pub fn summary(&self) -> SwarmSummary {
        self.summary
    }

    pub fn children(&self) -> &[SwarmId] {
        &self.children
    }

    pub fn final_state(&self) -> Option<&FinalState> {
        self.final_state.as_ref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn reserved_credits(&self) -> u64 {
        self.reserved_credits
    }

    pub fn remaining_credits(&self) -> u64 {
        self.allocation
            .max_credits
            .saturating_sub(self.summary.credits_used)
            .saturating_sub(self.reserved_credits)
    }

    pub fn remaining_duration_ms(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.created_at).num_milliseconds().max(0) as u64;
        self.allocation.max_duration_ms.saturating_sub(elapsed)
    }

    pub fn budget(&self, now: DateTime<Utc>) -> ParentBudget {
        ParentBudget {
            remaining_credits: self.remaining_credits(),
            remaining_duration_ms: self.remaining_duration_ms(now),
            parallel_execution_limit: self.allocation.parallel_execution_limit,
        }
    }

    pub fn start(&mut self) -> Result<(), SwarmError> {
        if self.state != SwarmState::Queued {
            return Err(self.invalid("start"));
        }
        self.state = SwarmState::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Reserve `credits` of this swarm's budget for a child.
    pub fn reserve_child(&mut self, child: SwarmId, credits: u64) -> Result<(), SwarmError> {
        if self.state.is_terminal() {
            return Err(self.invalid("spawn a child from"));
        }
        let available = self.remaining_credits();
        if credits > available {
            return Err(SwarmError::BudgetExceeded {
                swarm_id: self.id,
                requested: credits,
                available,
            });
        }
        self.reserved_credits += credits;
        self.children.push(child);
        Ok(())
    }

    /// Undo a reservation for a child that never started.
    pub fn release_child(&mut self, child: SwarmId, credits: u64) {
        if let Some(pos) = self.children.iter().position(|c| *c == child) {
            self.children.remove(pos);
            self.reserved_credits = self.reserved_credits.saturating_sub(credits);
        }
    }

    /// Convert a finished child's reservation into actual usage.
    pub fn settle_child(&mut self, child: SwarmId, reserved: u64, consumed: u64) {
        if self.children.contains(&child) {
            self.reserved_credits = self.reserved_credits.saturating_sub(reserved);
            self.summary.credits_used = self.summary.credits_used.saturating_add(consumed);
        }
    }

    /// Count one tool call and charge its credits.
    ///
    /// Exceeding the allocation fails the swarm.
    pub fn record_tool_call(&mut self, credits: u64) -> Result<SwarmSummary, SwarmError> {
        if self.state.is_terminal() {
            return Err(self.invalid("record a tool call on"));
        }
        let available = self.remaining_credits();
        self.summary.tool_calls += 1;
        self.summary.credits_used = self.summary.credits_used.saturating_add(credits);
        if credits > available {
            self.state = SwarmState::Failed;
            self.failure = Some(format!(
                "budget exceeded: {} of {} credits used",
                self.summary.credits_used, self.allocation.max_credits
            ));
            return Err(SwarmError::BudgetExceeded {
                swarm_id: self.id,
                requested: credits,
                available,
            });
        }
        Ok(self.summary)
    }

    pub fn record_sub_tasks(&mut self, total: u32, completed: u32) {
        self.summary.sub_tasks_total = total;
        self.summary.sub_tasks_completed = completed.min(total);
    }

    pub fn stop(
        &mut self,
        requested_mode: StopMode,
        reason: impl Into<String>,
    ) -> Result<FinalState, SwarmError> {
        if let Some(final_state) = &self.final_state {
            return Ok(final_state.clone());
        }
        if self.state == SwarmState::Failed {
            return Err(self.invalid("stop"));
        }

        let ended_at = Utc::now();
        let note = (requested_mode == StopMode::Force).then(|| FORCE_DEGRADED_NOTE.to_string());
        let final_state = FinalState {
            ended_at,
            mode: StopMode::Graceful,
            requested_mode,
            note,
            reason: reason.into(),
            totals: self.summary,
            duration_ms: (ended_at - self.created_at).num_milliseconds().max(0) as u64,
            children: self.children.clone(),
        };
        self.state = SwarmState::Stopped;
        self.final_state = Some(final_state.clone());
        Ok(final_state)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SwarmError> {
        if self.state.is_terminal() {
            return Err(self.invalid("fail"));
        }
        self.state = SwarmState::Failed;
        self.failure = Some(message.into());
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> SwarmError {
        SwarmError::InvalidState {
            swarm_id: self.id,
            operation,
            state: self.state,
        }
    }
}

impl Managed for Swarm {
    type Id = SwarmId;
    type Status = SwarmState;

    fn id(&self) -> SwarmId {
        self.id
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn status(&self) -> SwarmState {
        self.state
    }

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::AllocationTier;

    fn allocation(max_credits: u64) -> SwarmAllocation {
        SwarmAllocation {
            max_credits,
            max_duration_ms: 60_000,
            model: "gpt-4o".to_string(),
            parallel_execution_limit: 2,
            tier: AllocationTier::Enhanced,
            allocated_at: Utc::now(),
        }
    }

    fn running(max_credits: u64) -> Swarm {
        let mut swarm = Swarm::new_root(
            UserId::new("alice"),
            ConversationId::new("chat-1"),
            "goal",
            allocation(max_credits),
        );
        swarm.start().unwrap();
        swarm
    }

    #[test]
    fn test_graceful_stop_summary() {
        let mut swarm = running(100);
        swarm.record_tool_call(10).unwrap();
        let final_state = swarm.stop(StopMode::Graceful, "done").unwrap();
        assert_eq!(final_state.mode, StopMode::Graceful);
        assert!(final_state.note.is_none());
        assert_eq!(final_state.totals.credits_used, 10);
        assert_eq!(final_state.totals.tool_calls, 1);
        assert_eq!(swarm.state(), SwarmState::Stopped);
    }

    #[test]
    fn test_force_degrades_to_graceful() {
        let mut swarm = running(100);
        let final_state = swarm.stop(StopMode::Force, "abort").unwrap();
        assert_eq!(final_state.mode, StopMode::Graceful);
        assert_eq!(final_state.requested_mode, StopMode::Force);
        assert_eq!(final_state.note.as_deref(), Some(FORCE_DEGRADED_NOTE));
    }

    #[test]
    fn test_second_stop_returns_same_final_state() {
        let mut swarm = running(100);
        let first = swarm.stop(StopMode::Graceful, "done").unwrap();
        let second = swarm.stop(StopMode::Force, "again").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reservation_bounded_by_remaining() {
        let mut swarm = running(100);
        swarm.record_tool_call(30).unwrap();
        let child = SwarmId::new();
        assert!(matches!(
            swarm.reserve_child(child, 71),
            Err(SwarmError::BudgetExceeded { available: 70, .. })
        ));
        swarm.reserve_child(child, 70).unwrap();
        assert_eq!(swarm.remaining_credits(), 0);

        swarm.release_child(child, 70);
        assert_eq!(swarm.remaining_credits(), 70);
        assert!(swarm.children().is_empty());
    }

    #[test]
    fn test_settle_child_moves_reservation_into_usage() {
        let mut swarm = running(100);
        let child = SwarmId::new();
        swarm.reserve_child(child, 40).unwrap();
        swarm.settle_child(child, 40, 15);
        assert_eq!(swarm.reserved_credits(), 0);
        assert_eq!(swarm.summary().credits_used, 15);
        assert_eq!(swarm.remaining_credits(), 85);
    }

    #[test]
    fn test_budget_exceeded_fails_swarm() {
        let mut swarm = running(10);
        let err = swarm.record_tool_call(11).unwrap_err();
        assert!(matches!(err, SwarmError::BudgetExceeded { .. }));
        assert_eq!(swarm.state(), SwarmState::Failed);
        assert!(matches!(
            swarm.stop(StopMode::Graceful, "late"),
            Err(SwarmError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_child_inherits_owner_and_conversation() {
        let parent = running(100);
        let child = Swarm::new_child(&parent, "sub goal", allocation(10));
        assert_eq!(child.parent_swarm_id, Some(parent.id));
        assert_eq!(child.associated_user_id(), parent.associated_user_id());
        assert_eq!(child.conversation_id, parent.conversation_id);
        assert_eq!(child.state(), SwarmState::Queued);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Allocation
//!
//! A child swarm's budget is derived from its parent's remaining budget and
//! the richness of the spawn request. Richness is scored from four signals:
//!
//! | Signal | Point |
//! |--------|-------|
//! | goal of at least [`RICH_GOAL_CHARS`] characters | +1 |
//! | explicit team | +1 |
//! | explicit model hint | +1 |
//! | at least [`RICH_SUBTASK_COUNT`] initial sub-tasks | +1 |
//!
//! A score of 0 maps to [`AllocationTier::Basic`], 1 to
//! [`AllocationTier::Enhanced`] and 2 or more to [`AllocationTier::Rich`].
//!
//! ## Invariant
//!
//! `child.max_credits <= parent.remaining_credits` and
//! `child.max_duration_ms <= parent.remaining_duration_ms`, always.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use loom_core::domain::error::{Classify, ErrorKind};
use loom_core::domain::node_config::{AllocatorConfig, TierConfig};

pub const RICH_GOAL_CHARS: usize = 280;
pub const RICH_SUBTASK_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationTier {
    Basic,
    Enhanced,
    Rich,
}

impl fmt::Display for AllocationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => f.write_str("basic"),
            Self::Enhanced => f.write_str("enhanced"),
            Self::Rich => f.write_str("rich"),
        }
    }
}

/// Budget granted to a swarm. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmAllocation {
    pub max_credits: u64,
    pub max_duration_ms: u64,
    pub model: String,
    pub parallel_execution_limit: u32,
    pub tier: AllocationTier,
    pub allocated_at: DateTime<Utc>,
}

impl fmt::Display for SwarmAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tier, {} credits, {} minutes, model {}, up to {} parallel agents",
            self.tier,
            self.max_credits,
            self.max_duration_ms / 60_000,
            self.model,
            self.parallel_execution_limit
        )
    }
}

/// What the parent can still spend at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentBudget {
    pub remaining_credits: u64,
    pub remaining_duration_ms: u64,
    pub parallel_execution_limit: u32,
}

/// The parts of a spawn request that drive allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub goal: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub model_hint: Option<String>,
    #[serde(default)]
    pub initial_sub_tasks: Vec<String>,
}

impl SpawnRequest {
    pub fn richness(&self) -> u8 {
        let signals = [
            self.goal.chars().count() >= RICH_GOAL_CHARS,
            self.team_id.as_deref().is_some_and(|t| !t.trim().is_empty()),
            self.model_hint.as_deref().is_some_and(|m| !m.trim().is_empty()),
            self.initial_sub_tasks.len() >= RICH_SUBTASK_COUNT,
        ];
        signals.iter().filter(|s| **s).count() as u8
    }

    pub fn tier(&self) -> AllocationTier {
        match self.richness() {
            0 => AllocationTier::Basic,
            1 => AllocationTier::Enhanced,
            _ => AllocationTier::Rich,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("insufficient budget: parent has {remaining_credits} credits and {remaining_duration_ms} ms remaining")]
    InsufficientBudget {
        remaining_credits: u64,
        remaining_duration_ms: u64,
    },
}

impl Classify for AllocationError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidState
    }
}

#[derive(Debug, Clone)]
pub struct ResourceAllocator {
    config: AllocatorConfig,
}

impl ResourceAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    fn tier_config(&self, tier: AllocationTier) -> &TierConfig {
        match tier {
            AllocationTier::Basic => &self.config.tiers.basic,
            AllocationTier::Enhanced => &self.config.tiers.enhanced,
            AllocationTier::Rich => &self.config.tiers.rich,
        }
    }

    fn model_for(&self, tier: &TierConfig, request: &SpawnRequest) -> String {
        request
            .model_hint
            .as_deref()
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| tier.model.clone())
    }

    /// Budget for a root swarm, taken from configuration rather than a parent.
    pub fn allocate_root(&self, request: &SpawnRequest) -> SwarmAllocation {
        let tier = request.tier();
        let tier_config = self.tier_config(tier);
        SwarmAllocation {
            max_credits: self.config.root_max_credits,
            max_duration_ms: duration_ms(self.config.root_max_duration),
            model: self.model_for(tier_config, request),
            parallel_execution_limit: tier_config.parallelism.max(1),
            tier,
            allocated_at: Utc::now(),
        }
    }

    pub fn allocate_child(
        &self,
        parent: &ParentBudget,
        request: &SpawnRequest,
    ) -> Result<SwarmAllocation, AllocationError> {
        if parent.remaining_credits == 0 || parent.remaining_duration_ms == 0 {
            return Err(AllocationError::InsufficientBudget {
                remaining_credits: parent.remaining_credits,
                remaining_duration_ms: parent.remaining_duration_ms,
            });
        }

        let tier = request.tier();
        let tier_config = self.tier_config(tier);

        let max_credits = share_of(parent.remaining_credits, tier_config.share)
            .min(tier_config.credit_ceiling)
            .max(self.config.min_child_credits)
            .max(1)
            .min(parent.remaining_credits);

        let max_duration_ms = share_of(parent.remaining_duration_ms, tier_config.share)
            .min(duration_ms(tier_config.duration_ceiling))
            .max(1)
            .min(parent.remaining_duration_ms);

        let parallel_execution_limit = tier_config
            .parallelism
            .min(parent.parallel_execution_limit)
            .max(1);

        Ok(SwarmAllocation {
            max_credits,
            max_duration_ms,
            model: self.model_for(tier_config, request),
            parallel_execution_limit,
            tier,
            allocated_at: Utc::now(),
        })
    }
}

fn share_of(amount: u64, share: f64) -> u64 {
    (amount as f64 * share).floor() as u64
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Service - start, spawn and end swarms
//!
//! Spawning a child is atomic with respect to the parent: the allocation is
//! computed and the parent's budget reserved while the parent is locked, so
//! two concurrent spawns can never over-commit it. If the queue rejects the
//! child, the child is deregistered and the reservation released.
//!
//! Ending a swarm checks, in order: caller identity, live instance,
//! ownership or admin privilege, state machine. Live descendants are stopped
//! first, deepest first, so each swarm's totals already include everything
//! its subtree spent when it settles into its own parent. Later stops return
//! the same final state with no further side effects.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use loom_core::application::registry::RegistryError;
use loom_core::domain::conversation::ConversationId;
use loom_core::domain::error::{Classify, ErrorKind};
use loom_core::domain::events::SwarmEvent;
use loom_core::domain::identity::{AdminDirectory, CallerIdentity, UserId};
use loom_core::domain::queue::{JobDescriptor, TaskQueue};
use loom_core::infrastructure::event_bus::EventBus;

use crate::application::registry::{MostRecentOwnedPolicy, SwarmRegistry, SwarmResolutionPolicy};
use crate::domain::{
    AllocationError, FinalState, ResourceAllocator, SpawnRequest, StopMode, Swarm,
    SwarmAllocation, SwarmError, SwarmId, SwarmSummary,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnOutcome {
    pub swarm_id: SwarmId,
    pub parent_swarm_id: Option<SwarmId>,
    pub conversation_id: ConversationId,
    pub allocation: SwarmAllocation,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("spawn_swarm can only be called from within an active swarm context")]
    NoActiveParent,

    #[error("spawn_swarm can only be called from within an active swarm context: parent swarm {0} is not active")]
    ParentNotActive(SwarmId),

    #[error("User {user} is not allowed to spawn children of swarm {swarm_id}")]
    NotParentOwner { user: UserId, swarm_id: SwarmId },

    #[error("goal must not be empty")]
    EmptyGoal,

    #[error("Cannot allocate resources for a child of swarm {parent}: {source}")]
    Allocation {
        parent: SwarmId,
        #[source]
        source: AllocationError,
    },

    #[error("Cannot reserve budget on swarm {parent}: {source}")]
    Reservation {
        parent: SwarmId,
        #[source]
        source: SwarmError,
    },

    #[error("Failed to queue swarm task for swarm {swarm_id}: {message}")]
    Queue { swarm_id: SwarmId, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Classify for SpawnError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoActiveParent | Self::ParentNotActive(_) => ErrorKind::InvalidState,
            Self::NotParentOwner { .. } => ErrorKind::Unauthorized,
            Self::EmptyGoal => ErrorKind::Validation,
            Self::Allocation { .. } | Self::Reservation { .. } => ErrorKind::InvalidState,
            Self::Queue { .. } => ErrorKind::UpstreamFailure,
            Self::Registry(_) => ErrorKind::InvalidState,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndSwarmError {
    #[error("Authentication is required to end a swarm")]
    AuthenticationRequired,

    #[error("No active swarm instance found")]
    NoActiveSwarmInstance(Option<SwarmId>),

    #[error("User {user} is not allowed to end swarm {swarm_id}")]
    InsufficientPermissions { user: UserId, swarm_id: SwarmId },

    #[error("Swarm state machine rejected stop for swarm {swarm_id}: {message}")]
    StateMachine { swarm_id: SwarmId, message: String },
}

impl EndSwarmError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::NoActiveSwarmInstance(_) => "NO_ACTIVE_SWARM_INSTANCE",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::StateMachine { .. } => "SWARM_STATE_MACHINE_ERROR",
        }
    }
}

impl Classify for EndSwarmError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationRequired | Self::InsufficientPermissions { .. } => {
                ErrorKind::Unauthorized
            }
            Self::NoActiveSwarmInstance(_) => ErrorKind::NotFound,
            Self::StateMachine { .. } => ErrorKind::InvalidState,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwarmControlError {
    #[error("Swarm {0} not found in active swarms registry")]
    NotFound(SwarmId),

    #[error(transparent)]
    Swarm(#[from] SwarmError),
}

impl Classify for SwarmControlError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Swarm(inner) => inner.kind(),
        }
    }
}

#[async_trait]
pub trait SwarmService: Send + Sync {
    /// Start a root swarm for a conversation.
    async fn start_swarm(
        &self,
        caller: &CallerIdentity,
        conversation_id: ConversationId,
        request: SpawnRequest,
    ) -> Result<SpawnOutcome, SpawnError>;

    /// Spawn a child of `parent_id` with a budget carved from the parent's.
    async fn spawn_child(
        &self,
        caller: &CallerIdentity,
        parent_id: SwarmId,
        request: SpawnRequest,
    ) -> Result<SpawnOutcome, SpawnError>;

    async fn end_swarm(
        &self,
        caller: Option<&CallerIdentity>,
        swarm_id: Option<SwarmId>,
        mode: StopMode,
        reason: &str,
    ) -> Result<FinalState, EndSwarmError>;

    /// Count a tool call against the swarm's budget.
    async fn record_tool_call(
        &self,
        swarm_id: &SwarmId,
        credits: u64,
    ) -> Result<SwarmSummary, SwarmControlError>;

    /// Push a conversation's sub-task progress to its live swarms.
    /// Returns the swarms that were updated.
    async fn record_sub_tasks(
        &self,
        conversation_id: &ConversationId,
        total: u32,
        completed: u32,
    ) -> Vec<SwarmId>;

    async fn get_swarm(&self, swarm_id: &SwarmId) -> Option<Swarm>;

    /// The swarm a caller is working in when no swarm id is given.
    fn resolve_active_swarm(&self, user: &UserId) -> Option<SwarmId>;
}

pub struct StandardSwarmService {
    registry: Arc<SwarmRegistry>,
    allocator: ResourceAllocator,
    queue: Arc<dyn TaskQueue>,
    event_bus: EventBus,
    admins: Arc<dyn AdminDirectory>,
    policy: Arc<dyn SwarmResolutionPolicy>,
}

impl StandardSwarmService {
    pub fn new(
        registry: Arc<SwarmRegistry>,
        allocator: ResourceAllocator,
        queue: Arc<dyn TaskQueue>,
        event_bus: EventBus,
        admins: Arc<dyn AdminDirectory>,
    ) -> Self {
        Self {
            registry,
            allocator,
            queue,
            event_bus,
            admins,
            policy: Arc::new(MostRecentOwnedPolicy),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SwarmResolutionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<SwarmRegistry> {
        &self.registry
    }

    /// Register, queue and start a freshly built swarm.
    async fn launch(&self, swarm: Swarm) -> Result<SpawnOutcome, SpawnError> {
        let swarm_id = swarm.id;
        let parent_swarm_id = swarm.parent_swarm_id;
        let conversation_id = swarm.conversation_id.clone();
        let allocation = swarm.allocation().clone();
        let user_id = swarm.associated_user_id().clone();
        let payload = json!({
            "swarmId": swarm_id,
            "parentSwarmId": parent_swarm_id,
            "conversationId": conversation_id,
            "goal": swarm.goal,
            "allocation": allocation,
        });

        if let Err(err) = self.registry.register(swarm) {
            self.release_reservation(parent_swarm_id, swarm_id, allocation.max_credits)
                .await;
            return Err(err.into());
        }

        let ack = self
            .queue
            .submit(JobDescriptor::swarm(swarm_id, user_id.clone(), payload))
            .await;
        if !ack.success {
            warn!(swarm_id = %swarm_id, error = %ack.error_message(), "Swarm task rejected by queue");
            self.registry.deregister(&swarm_id);
            self.release_reservation(parent_swarm_id, swarm_id, allocation.max_credits)
                .await;
            return Err(SpawnError::Queue {
                swarm_id,
                message: ack.error_message().to_string(),
            });
        }

        if let Some(Err(err)) = self.registry.with_swarm(&swarm_id, Swarm::start).await {
            warn!(swarm_id = %swarm_id, error = %err, "Queued swarm could not be started");
        }

        info!(
            swarm_id = %swarm_id,
            parent_swarm_id = ?parent_swarm_id,
            tier = %allocation.tier,
            max_credits = allocation.max_credits,
            "Swarm started"
        );
        self.event_bus.publish_swarm_event(SwarmEvent::SwarmStarted {
            swarm_id,
            parent_swarm_id,
            conversation_id: conversation_id.clone(),
            user_id,
            tier: allocation.tier.to_string(),
            started_at: Utc::now(),
        });

        Ok(SpawnOutcome {
            swarm_id,
            parent_swarm_id,
            conversation_id,
            allocation,
            job_id: ack.job_id,
        })
    }

    async fn release_reservation(&self, parent: Option<SwarmId>, child: SwarmId, credits: u64) {
        if let Some(parent) = parent {
            self.registry
                .with_swarm(&parent, |p| p.release_child(child, credits))
                .await;
        }
    }

    /// Stop one swarm. `None` when the swarm is not registered.
    async fn stop_and_settle(
        &self,
        swarm_id: SwarmId,
        mode: StopMode,
        reason: &str,
    ) -> Option<Result<FinalState, SwarmError>> {
        let result = self
            .registry
            .with_swarm(&swarm_id, |swarm| {
                let first = swarm.final_state().is_none();
                swarm.stop(mode, reason).map(|final_state| {
                    (
                        final_state,
                        first,
                        swarm.parent_swarm_id,
                        swarm.allocation().max_credits,
                        swarm.conversation_id.clone(),
                    )
                })
            })
            .await?;

        let (final_state, first, parent, reserved, conversation_id) = match result {
            Ok(values) => values,
            Err(err) => return Some(Err(err)),
        };

        if first {
            info!(
                swarm_id = %swarm_id,
                requested_mode = %final_state.requested_mode,
                mode = %final_state.mode,
                reason = %final_state.reason,
                "Swarm stopped"
            );
            self.event_bus.publish_swarm_event(SwarmEvent::SwarmEnded {
                swarm_id,
                conversation_id,
                state: "stopped".to_string(),
                mode: final_state.mode.to_string(),
                reason: final_state.reason.clone(),
                ended_at: final_state.ended_at,
            });
            if let Some(parent) = parent {
                let consumed = final_state.totals.credits_used;
                self.registry
                    .with_swarm(&parent, |p| p.settle_child(swarm_id, reserved, consumed))
                    .await;
            }
            self.registry.schedule_reap(swarm_id);
        }

        Some(Ok(final_state))
    }

    /// Stop every live descendant of `root`, deepest first.
    ///
    /// A swarm settles into its parent when it stops, so a child must stop
    /// after its own children or their spending never reaches the ancestors.
    async fn stop_descendants(&self, root: SwarmId, reason: &str) {
        let reason = format!("parent swarm {root} ended: {reason}");

        // Each swarm lands in `order` before any of its children.
        let mut order = Vec::new();
        let mut frontier = vec![root];
        while let Some(id) = frontier.pop() {
            let children = self
                .registry
                .with_swarm(&id, |swarm| swarm.children().to_vec())
                .await
                .unwrap_or_default();
            order.extend(children.iter().copied());
            frontier.extend(children);
        }

        for child in order.into_iter().rev() {
            let live = self
                .registry
                .record(&child)
                .is_some_and(|record| !record.terminal);
            if !live {
                continue;
            }
            if let Some(Err(err)) = self.stop_and_settle(child, StopMode::Graceful, &reason).await {
                warn!(swarm_id = %child, error = %err, "Could not stop child swarm");
            }
        }
    }
}

#[async_trait]
impl SwarmService for StandardSwarmService {
    async fn start_swarm(
        &self,
        caller: &CallerIdentity,
        conversation_id: ConversationId,
        request: SpawnRequest,
    ) -> Result<SpawnOutcome, SpawnError> {
        if request.goal.trim().is_empty() {
            return Err(SpawnError::EmptyGoal);
        }
        let allocation = self.allocator.allocate_root(&request);
        let swarm = Swarm::new_root(
            caller.user_id.clone(),
            conversation_id,
            request.goal.clone(),
            allocation,
        );
        self.launch(swarm).await
    }

    async fn spawn_child(
        &self,
        caller: &CallerIdentity,
        parent_id: SwarmId,
        request: SpawnRequest,
    ) -> Result<SpawnOutcome, SpawnError> {
        let parent = self
            .registry
            .record(&parent_id)
            .filter(|record| !record.terminal)
            .ok_or(SpawnError::ParentNotActive(parent_id))?;

        if parent.owner != caller.user_id && !caller.has_admin_privilege(self.admins.as_ref()).await {
            return Err(SpawnError::NotParentOwner {
                user: caller.user_id.clone(),
                swarm_id: parent_id,
            });
        }

        if request.goal.trim().is_empty() {
            return Err(SpawnError::EmptyGoal);
        }

        let allocator = &self.allocator;
        let child = self
            .registry
            .with_swarm(&parent_id, |parent| {
                if parent.state().is_terminal() {
                    return Err(SpawnError::ParentNotActive(parent_id));
                }
                let budget = parent.budget(Utc::now());
                let allocation = allocator
                    .allocate_child(&budget, &request)
                    .map_err(|source| SpawnError::Allocation {
                        parent: parent_id,
                        source,
                    })?;
                let child = Swarm::new_child(parent, request.goal.clone(), allocation);
                parent
                    .reserve_child(child.id, child.allocation().max_credits)
                    .map_err(|source| SpawnError::Reservation {
                        parent: parent_id,
                        source,
                    })?;
                Ok(child)
            })
            .await
            .ok_or(SpawnError::ParentNotActive(parent_id))??;

        self.launch(child).await
    }

    async fn end_swarm(
        &self,
        caller: Option<&CallerIdentity>,
        swarm_id: Option<SwarmId>,
        mode: StopMode,
        reason: &str,
    ) -> Result<FinalState, EndSwarmError> {
        let caller = caller
            .filter(|c| !c.user_id.as_str().trim().is_empty())
            .ok_or(EndSwarmError::AuthenticationRequired)?;

        let swarm_id = swarm_id.ok_or(EndSwarmError::NoActiveSwarmInstance(None))?;
        let record = self
            .registry
            .record(&swarm_id)
            .ok_or(EndSwarmError::NoActiveSwarmInstance(Some(swarm_id)))?;

        if record.owner != caller.user_id && !caller.has_admin_privilege(self.admins.as_ref()).await {
            return Err(EndSwarmError::InsufficientPermissions {
                user: caller.user_id.clone(),
                swarm_id,
            });
        }

        if !record.terminal {
            self.stop_descendants(swarm_id, reason).await;
        }

        self.stop_and_settle(swarm_id, mode, reason)
            .await
            .ok_or(EndSwarmError::NoActiveSwarmInstance(Some(swarm_id)))?
            .map_err(|err| EndSwarmError::StateMachine {
                swarm_id,
                message: err.to_string(),
            })
    }

    async fn record_tool_call(
        &self,
        swarm_id: &SwarmId,
        credits: u64,
    ) -> Result<SwarmSummary, SwarmControlError> {
        let (result, conversation_id, max_credits, parent, summary) = self
            .registry
            .with_swarm(swarm_id, |swarm| {
                let result = swarm.record_tool_call(credits);
                (
                    result,
                    swarm.conversation_id.clone(),
                    swarm.allocation().max_credits,
                    swarm.parent_swarm_id,
                    swarm.summary(),
                )
            })
            .await
            .ok_or(SwarmControlError::NotFound(*swarm_id))?;

        if let Err(SwarmError::BudgetExceeded { .. }) = &result {
            warn!(swarm_id = %swarm_id, credits_used = summary.credits_used, max_credits, "Swarm budget exceeded");
            self.event_bus.publish_swarm_event(SwarmEvent::SwarmBudgetExceeded {
                swarm_id: *swarm_id,
                conversation_id,
                credits_used: summary.credits_used,
                max_credits,
                exceeded_at: Utc::now(),
            });
            self.stop_descendants(*swarm_id, "budget exceeded").await;
            if let Some(parent) = parent {
                let id = *swarm_id;
                let consumed = self
                    .registry
                    .with_swarm(&id, |swarm| swarm.summary().credits_used)
                    .await
                    .unwrap_or(summary.credits_used);
                self.registry
                    .with_swarm(&parent, |p| p.settle_child(id, max_credits, consumed))
                    .await;
            }
            self.registry.schedule_reap(*swarm_id);
        }
        result.map_err(SwarmControlError::from)
    }

    async fn record_sub_tasks(
        &self,
        conversation_id: &ConversationId,
        total: u32,
        completed: u32,
    ) -> Vec<SwarmId> {
        let mut updated = Vec::new();
        for record in self.registry.get_ordered_records() {
            if record.terminal {
                continue;
            }
            let matched = self
                .registry
                .with_swarm(&record.id, |swarm| {
                    let matches = &swarm.conversation_id == conversation_id && !swarm.state().is_terminal();
                    if matches {
                        swarm.record_sub_tasks(total, completed);
                    }
                    matches
                })
                .await
                .unwrap_or(false);
            if matched {
                updated.push(record.id);
            }
        }
        if !updated.is_empty() {
            debug!(
                conversation_id = %conversation_id,
                total,
                completed,
                swarms = updated.len(),
                "Sub-task progress recorded"
            );
        }
        updated
    }

    async fn get_swarm(&self, swarm_id: &SwarmId) -> Option<Swarm> {
        self.registry.get(swarm_id).await
    }

    fn resolve_active_swarm(&self, user: &UserId) -> Option<SwarmId> {
        self.policy
            .resolve(&self.registry.get_ordered_records(), user)
    }
}

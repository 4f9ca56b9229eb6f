// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalId, ToolApprovalRequest};
use crate::domain::conversation::{ConversationId, Facet};
use crate::domain::identity::UserId;
use crate::domain::run::{RunId, RunState};
use crate::domain::swarm_context::SwarmId;

/// Run lifecycle events, published by the run registry after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunRegistered {
        run_id: RunId,
        user_id: UserId,
        conversation_id: Option<ConversationId>,
        swarm_id: Option<SwarmId>,
        registered_at: DateTime<Utc>,
    },
    RunTransitioned {
        run_id: RunId,
        conversation_id: Option<ConversationId>,
        from: RunState,
        to: RunState,
        transitioned_at: DateTime<Utc>,
    },
    RunDeregistered {
        run_id: RunId,
        deregistered_at: DateTime<Utc>,
    },
}

/// Swarm lifecycle events. States are carried as their wire labels since the
/// swarm aggregate lives outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwarmEvent {
    SwarmStarted {
        swarm_id: SwarmId,
        parent_swarm_id: Option<SwarmId>,
        conversation_id: ConversationId,
        user_id: UserId,
        tier: String,
        started_at: DateTime<Utc>,
    },
    SwarmEnded {
        swarm_id: SwarmId,
        conversation_id: ConversationId,
        state: String,
        mode: String,
        reason: String,
        ended_at: DateTime<Utc>,
    },
    SwarmBudgetExceeded {
        swarm_id: SwarmId,
        conversation_id: ConversationId,
        credits_used: u64,
        max_credits: u64,
        exceeded_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApprovalEvent {
    ApprovalRequested {
        request: ToolApprovalRequest,
    },
    ApprovalResolved {
        approval_id: ApprovalId,
        conversation_id: ConversationId,
        status: String,
        resolved_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConversationEvent {
    SharedStateUpdated {
        conversation_id: ConversationId,
        facet: Facet,
        version: u64,
        updated_by: Option<UserId>,
        updated_at: DateTime<Utc>,
    },
    MessagePosted {
        conversation_id: ConversationId,
        message_id: String,
        author: UserId,
        posted_at: DateTime<Utc>,
    },
}

impl RunEvent {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::RunRegistered {
                conversation_id, ..
            }
            | Self::RunTransitioned {
                conversation_id, ..
            } => conversation_id.as_ref(),
            Self::RunDeregistered { .. } => None,
        }
    }
}

impl SwarmEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::SwarmStarted {
                conversation_id, ..
            }
            | Self::SwarmEnded {
                conversation_id, ..
            }
            | Self::SwarmBudgetExceeded {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

impl ApprovalEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::ApprovalRequested { request } => &request.context.conversation_id,
            Self::ApprovalResolved {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

impl ConversationEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::SharedStateUpdated {
                conversation_id, ..
            }
            | Self::MessagePosted {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

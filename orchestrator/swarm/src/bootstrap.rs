// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wiring of the orchestration core from a node configuration.
//!
//! [`Orchestrator`] owns one instance of every long-lived component. Transports
//! (the HTTP daemon, tests) hold it behind an `Arc` and reach the components
//! through its fields.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use loom_core::application::conversation_store::ConversationStore;
use loom_core::application::run_registry::RunRegistry;
use loom_core::domain::conversation::{ConversationConfig, ConversationId, ConversationStateError, TeamConfig};
use loom_core::domain::error::{Classify, ErrorKind};
use loom_core::domain::identity::{AdminDirectory, CallerIdentity, StaticAdminDirectory, UserId};
use loom_core::domain::node_config::NodeConfigManifest;
use loom_core::domain::queue::TaskQueue;
use loom_core::domain::repository::PersistenceService;
use loom_core::infrastructure::approval_service::ApprovalService;
use loom_core::infrastructure::event_bus::EventBus;
use loom_core::infrastructure::persistence::InMemoryPersistence;
use loom_core::infrastructure::queue::InMemoryTaskQueue;

use crate::application::registry::SwarmRegistry;
use crate::application::service::{SpawnError, SpawnOutcome, StandardSwarmService, SwarmService};
use crate::domain::{ResourceAllocator, SpawnRequest};
use crate::tools::gateway::ToolGateway;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartSwarmError {
    #[error(transparent)]
    Conversation(#[from] ConversationStateError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

impl Classify for StartSwarmError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Conversation(inner) => inner.kind(),
            Self::Spawn(inner) => inner.kind(),
        }
    }
}

pub struct Orchestrator {
    pub config: NodeConfigManifest,
    pub event_bus: EventBus,
    pub persistence: Arc<dyn PersistenceService>,
    pub queue: Arc<dyn TaskQueue>,
    pub admins: Arc<dyn AdminDirectory>,
    pub runs: Arc<RunRegistry>,
    pub swarms: Arc<StandardSwarmService>,
    pub conversations: Arc<ConversationStore>,
    pub approvals: Arc<ApprovalService>,
    pub gateway: Arc<ToolGateway>,
}

impl Orchestrator {
    /// Everything in memory: persistence, queue and registries.
    pub fn in_memory(config: &NodeConfigManifest) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryPersistence::new()),
            Arc::new(InMemoryTaskQueue::new()),
        )
    }

    pub fn with_collaborators(
        config: &NodeConfigManifest,
        persistence: Arc<dyn PersistenceService>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        let spec = &config.spec;
        let event_bus = EventBus::new(spec.event_bus.capacity);
        let admins: Arc<dyn AdminDirectory> = Arc::new(StaticAdminDirectory::new(
            spec.platform
                .admin_user_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(UserId::new),
        ));

        let runs = Arc::new(RunRegistry::new(
            event_bus.clone(),
            spec.registry.run_reap_grace,
        ));
        let swarms = Arc::new(StandardSwarmService::new(
            Arc::new(SwarmRegistry::new(spec.registry.swarm_reap_grace)),
            ResourceAllocator::new(spec.allocator.clone()),
            queue.clone(),
            event_bus.clone(),
            admins.clone(),
        ));
        let conversations = Arc::new(ConversationStore::new(
            persistence.clone(),
            event_bus.clone(),
        ));
        let approvals = Arc::new(ApprovalService::new(
            event_bus.clone(),
            spec.approvals.default_timeout,
        ));

        let gateway = Arc::new(
            ToolGateway::new(
                runs.clone(),
                swarms.clone(),
                conversations.clone(),
                persistence.clone(),
                queue.clone(),
                approvals.clone(),
                event_bus.clone(),
                admins.clone(),
            )
            .with_approval_required(spec.approvals.require_approval_for.iter().cloned()),
        );

        info!(
            node = %config.metadata.name,
            gated_tools = ?spec.approvals.require_approval_for,
            "Orchestrator initialized"
        );

        Self {
            config: config.clone(),
            event_bus,
            persistence,
            queue,
            admins,
            runs,
            swarms,
            conversations,
            approvals,
            gateway,
        }
    }

    /// Start a root swarm for a conversation, creating the conversation's
    /// shared state first when it has none.
    pub async fn start_swarm(
        &self,
        caller: &CallerIdentity,
        conversation_id: ConversationId,
        request: SpawnRequest,
    ) -> Result<SpawnOutcome, StartSwarmError> {
        if self.conversations.get(&conversation_id).await.is_none() {
            let team_config = request.team_id.as_ref().map(|team_id| TeamConfig {
                team_id: Some(team_id.clone()),
                goal: Some(request.goal.clone()),
                ..TeamConfig::default()
            });
            self.conversations
                .insert(
                    conversation_id.clone(),
                    ConversationConfig {
                        team_config,
                        ..ConversationConfig::default()
                    },
                )
                .await?;
        }
        Ok(self
            .swarms
            .start_swarm(caller, conversation_id, request)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_swarm_creates_conversation_state() {
        let orchestrator = Orchestrator::in_memory(&NodeConfigManifest::default());
        let conversation = ConversationId::new("chat-1");
        let outcome = orchestrator
            .start_swarm(
                &CallerIdentity::user("alice"),
                conversation.clone(),
                SpawnRequest {
                    goal: "write the release notes".to_string(),
                    team_id: Some("team-1".to_string()),
                    ..SpawnRequest::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.parent_swarm_id.is_none());
        let state = orchestrator.conversations.get(&conversation).await.unwrap();
        let team = state.config.unwrap().team_config.unwrap();
        assert_eq!(team.team_id.as_deref(), Some("team-1"));
        assert_eq!(orchestrator.swarms.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_platform_admin_from_config() {
        let mut config = NodeConfigManifest::default();
        config.spec.platform.admin_user_id = Some("root".to_string());
        let orchestrator = Orchestrator::in_memory(&config);
        assert!(
            CallerIdentity::user("root")
                .has_admin_privilege(orchestrator.admins.as_ref())
                .await
        );
        assert!(
            !CallerIdentity::user("alice")
                .has_admin_privilege(orchestrator.admins.as_ref())
                .await
        );
    }
}

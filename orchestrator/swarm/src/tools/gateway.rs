// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool Gateway - the single entry point for agent tool calls
//!
//! Every call goes through the same pipeline:
//!
//! 1. parse the tool name and arguments into a [`ToolOperation`]
//! 2. hold the call on a human approval when the tool requires one
//! 3. dispatch to the run registry, swarm service, conversation store or
//!    persistence collaborator
//! 4. count the call against the caller's swarm, if any
//!
//! Nothing below this boundary reaches the caller as a fault. Every failure is
//! rendered into an error [`ToolResponse`] naming the tool or entity involved.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use loom_core::application::conversation_store::ConversationStore;
use loom_core::application::run_registry::RunRegistry;
use loom_core::domain::approval::{ApprovalContext, ApprovalStatus};
use loom_core::domain::error::{Classify, ErrorKind};
use loom_core::domain::identity::{AdminDirectory, CallerIdentity};
use loom_core::domain::queue::TaskQueue;
use loom_core::domain::repository::{PersistenceService, ResourceKind};
use loom_core::infrastructure::approval_service::ApprovalService;
use loom_core::infrastructure::event_bus::EventBus;

use crate::application::service::SwarmService;
use crate::tools::envelope::{CallContext, ToolCallRequest, ToolResponse};
use crate::tools::error::ToolError;
use crate::tools::operation::{ToolDescriptor, ToolOperation};

pub struct ToolGateway {
    pub(crate) runs: Arc<RunRegistry>,
    pub(crate) swarms: Arc<dyn SwarmService>,
    pub(crate) conversations: Arc<ConversationStore>,
    pub(crate) persistence: Arc<dyn PersistenceService>,
    pub(crate) queue: Arc<dyn TaskQueue>,
    pub(crate) approvals: Arc<ApprovalService>,
    pub(crate) event_bus: EventBus,
    pub(crate) admins: Arc<dyn AdminDirectory>,
    require_approval: HashSet<String>,
}

impl ToolGateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runs: Arc<RunRegistry>,
        swarms: Arc<dyn SwarmService>,
        conversations: Arc<ConversationStore>,
        persistence: Arc<dyn PersistenceService>,
        queue: Arc<dyn TaskQueue>,
        approvals: Arc<ApprovalService>,
        event_bus: EventBus,
        admins: Arc<dyn AdminDirectory>,
    ) -> Self {
        Self {
            runs,
            swarms,
            conversations,
            persistence,
            queue,
            approvals,
            event_bus,
            admins,
            require_approval: HashSet::new(),
        }
    }

    /// Tools that wait for a human decision before running.
    pub fn with_approval_required<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_approval = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.require_approval.contains(tool_name)
    }

    /// Built-in tools followed by every defined tool.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = ToolOperation::catalogue();
        match self
            .persistence
            .find(ResourceKind::ToolDefinition, &serde_json::Map::new())
            .await
        {
            Ok(records) => {
                tools.extend(records.into_iter().map(|record| ToolDescriptor {
                    name: record.id.clone(),
                    description: record.data_str("description").unwrap_or_default().to_string(),
                    input_schema: record.data.get("inputSchema").cloned().unwrap_or_default(),
                    builtin: false,
                }));
            }
            Err(err) => warn!(error = %err, "Failed to list defined tools"),
        }
        tools
    }

    pub async fn call(&self, ctx: &CallContext, request: ToolCallRequest) -> ToolResponse {
        let metric_label = if ToolOperation::is_builtin(&request.tool_name) {
            request.tool_name.clone()
        } else {
            "unknown".to_string()
        };

        let response = match self.execute(ctx, request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(tool = %metric_label, kind = %err.kind(), error = %err, "Tool call failed");
                ToolResponse::from(err)
            }
        };

        let outcome = if response.is_error { "error" } else { "success" };
        metrics::counter!("loom_tool_calls_total", "tool" => metric_label, "outcome" => outcome)
            .increment(1);
        response
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        request: ToolCallRequest,
    ) -> Result<ToolResponse, ToolError> {
        let operation = ToolOperation::parse(&request.tool_name, &request.arguments)?;
        let tool = operation.name();
        debug!(
            tool,
            caller = ?ctx.caller.as_ref().map(|c| c.user_id.as_str()),
            conversation_id = ?ctx.conversation_id.as_ref().map(|c| c.as_str()),
            swarm_id = ?ctx.swarm_id,
            "Dispatching tool call"
        );

        self.await_approval(ctx, tool, &request.arguments).await?;

        let result = match operation {
            ToolOperation::DefineTool(args) => self.define_tool(ctx, args).await,
            ToolOperation::SendMessage(args) => self.send_message(ctx, args).await,
            ToolOperation::ResourceManage(args) => self.resource_manage(ctx, args).await,
            ToolOperation::RunRoutine(args) => self.run_routine(ctx, args).await,
            ToolOperation::ManageRun(args) => self.manage_run(ctx, args).await,
            ToolOperation::SpawnSwarm(args) => self.spawn_swarm(ctx, args).await,
            ToolOperation::UpdateSwarmSharedState(args) => {
                self.update_swarm_shared_state(ctx, args).await
            }
            ToolOperation::EndSwarm(args) => self.end_swarm(ctx, args).await,
        };

        if let Some(swarm_id) = ctx.swarm_id {
            if let Err(err) = self.swarms.record_tool_call(&swarm_id, 0).await {
                debug!(swarm_id = %swarm_id, error = %err, "Tool call not counted against swarm");
            }
        }
        result
    }

    /// Hold a gated call until a human decides. Calls without a conversation
    /// have nobody to ask and run directly.
    async fn await_approval(
        &self,
        ctx: &CallContext,
        tool: &'static str,
        arguments: &serde_json::Value,
    ) -> Result<(), ToolError> {
        if !self.requires_approval(tool) {
            return Ok(());
        }
        let Some(conversation_id) = ctx.conversation_id.clone() else {
            return Ok(());
        };
        let caller = require_caller(ctx)?;

        let context = ApprovalContext {
            conversation_id,
            run_id: ctx.run_id,
            swarm_id: ctx.swarm_id,
        };
        let ticket = self
            .approvals
            .open(context, tool, arguments.clone(), caller.user_id.clone(), None)
            .await;
        let approval_id = ticket.request.id;
        let timeout_ms = ticket.request.timeout_ms;

        match ticket.wait().await {
            ApprovalStatus::Granted { .. } => {
                info!(tool, approval_id = %approval_id, "Tool call approved");
                Ok(())
            }
            ApprovalStatus::Rejected { reason, .. } => Err(ToolError::failed(
                ErrorKind::Unauthorized,
                format!("Tool call {tool} was rejected (approval {approval_id}): {reason}"),
            )),
            ApprovalStatus::TimedOut { .. } | ApprovalStatus::Pending => Err(ToolError::failed(
                ErrorKind::Timeout,
                format!(
                    "Approval {approval_id} for tool call {tool} was not granted within {timeout_ms} ms"
                ),
            )),
        }
    }
}

/// The verified caller, or an error naming the missing session.
pub(crate) fn require_caller(ctx: &CallContext) -> Result<&CallerIdentity, ToolError> {
    ctx.caller
        .as_ref()
        .filter(|caller| !caller.user_id.as_str().trim().is_empty())
        .ok_or_else(|| {
            ToolError::failed(
                ErrorKind::Unauthorized,
                "This tool requires an authenticated caller",
            )
        })
}

/// Trimmed, non-empty optional string.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

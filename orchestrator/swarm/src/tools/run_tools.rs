// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `run_routine` and `manage_run`.

use serde_json::json;
use tracing::{info, warn};

use loom_core::application::run_registry::RunControlError;
use loom_core::domain::error::ErrorKind;
use loom_core::domain::identity::CallerIdentity;
use loom_core::domain::queue::JobDescriptor;
use loom_core::domain::run::{Run, RunId, RunMode};
use loom_core::domain::swarm_context::SwarmContext;

use crate::tools::envelope::{CallContext, ToolResponse};
use crate::tools::error::ToolError;
use crate::tools::gateway::{non_empty, require_caller, ToolGateway};
use crate::tools::operation::{ManageRunArgs, RunAction, RunRoutineArgs, MANAGE_RUN, RUN_ROUTINE};

const DEFAULT_CANCEL_REASON: &str = "Cancelled by user";

impl ToolGateway {
    /// The caller's live swarm: the call's own swarm if given, otherwise the
    /// most recent one the caller owns.
    pub(crate) async fn active_swarm_context(
        &self,
        ctx: &CallContext,
        caller: &CallerIdentity,
    ) -> Option<SwarmContext> {
        let swarm_id = ctx
            .swarm_id
            .or_else(|| self.swarms.resolve_active_swarm(&caller.user_id))?;
        let swarm = self.swarms.get_swarm(&swarm_id).await?;
        if swarm.state().is_terminal() {
            return None;
        }
        if swarm.associated_user_id() != &caller.user_id
            && !caller.has_admin_privilege(self.admins.as_ref()).await
        {
            return None;
        }
        Some(SwarmContext {
            swarm_id,
            parent_swarm_id: swarm.parent_swarm_id,
        })
    }

    pub(crate) async fn run_routine(
        &self,
        ctx: &CallContext,
        args: RunRoutineArgs,
    ) -> Result<ToolResponse, ToolError> {
        let caller = require_caller(ctx)?;
        let routine_version_id = non_empty(Some(args.routine_version_id))
            .ok_or_else(|| ToolError::invalid(RUN_ROUTINE, "routineVersionId must not be empty"))?;
        if !(args.inputs.is_null() || args.inputs.is_object()) {
            return Err(ToolError::invalid(RUN_ROUTINE, "inputs must be an object"));
        }
        let inputs = if args.inputs.is_null() {
            json!({})
        } else {
            args.inputs
        };

        let swarm_context = match args.mode {
            Some(RunMode::Standalone) => None,
            Some(RunMode::SwarmIntegrated) => Some(
                self.active_swarm_context(ctx, caller).await.ok_or_else(|| {
                    ToolError::failed(
                        ErrorKind::InvalidState,
                        "run_routine in swarm-integrated mode requires an active swarm context",
                    )
                })?,
            ),
            None => self.active_swarm_context(ctx, caller).await,
        };

        let run = Run::new(
            routine_version_id.clone(),
            caller.user_id.clone(),
            swarm_context,
            ctx.conversation_id.clone(),
            inputs.clone(),
        );
        let run_id = run.id;
        let mode = run.mode;
        self.runs
            .register(run)
            .map_err(|e| ToolError::from_component(&e))?;

        let payload = json!({
            "runId": run_id,
            "routineVersionId": routine_version_id,
            "mode": mode,
            "inputs": inputs,
            "swarmId": swarm_context.map(|c| c.swarm_id),
            "parentSwarmId": swarm_context.and_then(|c| c.parent_swarm_id),
            "conversationId": ctx.conversation_id,
        });
        let ack = self
            .queue
            .submit(JobDescriptor::run(run_id, caller.user_id.clone(), payload))
            .await;
        if !ack.success {
            warn!(run_id = %run_id, error = %ack.error_message(), "Run task rejected by queue");
            self.runs.deregister(&run_id);
            return Err(ToolError::failed(
                ErrorKind::UpstreamFailure,
                format!(
                    "Failed to queue run task for run {run_id}: {}",
                    ack.error_message()
                ),
            ));
        }

        self.runs
            .start(&run_id)
            .await
            .map_err(|e| ToolError::from_component(&e))?;
        info!(run_id = %run_id, mode = %mode, job_id = ?ack.job_id, "Run queued and started");

        let mut text = format!("Run started successfully. Run ID: {run_id}. Mode: {mode}.");
        if let Some(context) = swarm_context {
            text.push_str(&format!(" Swarm: {}.", context.swarm_id));
        }
        if let Some(job_id) = ack.job_id {
            text.push_str(&format!(" Job ID: {job_id}."));
        }
        Ok(ToolResponse::text(text))
    }

    pub(crate) async fn manage_run(
        &self,
        ctx: &CallContext,
        args: ManageRunArgs,
    ) -> Result<ToolResponse, ToolError> {
        let caller = require_caller(ctx)?;
        let run_id: RunId = args.run_id.trim().parse().map_err(|e| {
            ToolError::invalid(MANAGE_RUN, format!("runId '{}' is not a valid id: {e}", args.run_id))
        })?;

        let run = self
            .runs
            .get(&run_id)
            .await
            .ok_or_else(|| ToolError::from_component(&RunControlError::NotFound(run_id)))?;
        if run.user_id != caller.user_id && !caller.has_admin_privilege(self.admins.as_ref()).await {
            return Err(ToolError::failed(
                ErrorKind::Unauthorized,
                format!("User {} is not allowed to manage run {run_id}", caller.user_id),
            ));
        }

        let component = |e: RunControlError| ToolError::from_component(&e);
        match args.action {
            RunAction::Status => Ok(ToolResponse::json(
                &json!({
                    "runId": run.id,
                    "routineVersionId": run.routine_version_id,
                    "state": run.state(),
                    "mode": run.mode,
                    "stepCursor": run.step_cursor(),
                    "usage": run.usage(),
                    "swarmId": run.swarm_id(),
                    "parentSwarmId": run.parent_swarm_id(),
                    "stopReason": run.stop_reason(),
                    "failure": run.failure(),
                    "createdAt": run.created_at,
                    "updatedAt": run.updated_at,
                }),
                false,
            )),
            RunAction::Pause => {
                self.runs.pause(&run_id).await.map_err(component)?;
                Ok(ToolResponse::text(format!("Run {run_id} paused.")))
            }
            RunAction::Cancel => {
                let reason =
                    non_empty(args.reason).unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
                self.runs
                    .stop(&run_id, reason.clone())
                    .await
                    .map_err(component)?;
                Ok(ToolResponse::text(format!("Run {run_id} cancelled: {reason}")))
            }
            RunAction::Resume => {
                self.runs.resume(&run_id).await.map_err(component)?;
                Ok(ToolResponse::text(format!("Run {run_id} resumed.")))
            }
        }
    }
}

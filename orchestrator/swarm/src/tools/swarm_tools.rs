// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `spawn_swarm`, `update_swarm_shared_state` and `end_swarm`.
//!
//! The last two answer with a JSON body carrying `success` and, on failure,
//! a stable `error` code, so agents can branch on the code rather than the
//! message text.

use serde_json::{json, Value};
use tracing::info;

use loom_core::domain::conversation::ConversationId;

use crate::application::service::SpawnError;
use crate::domain::{SpawnRequest, SwarmId};
use crate::tools::envelope::{CallContext, ToolResponse};
use crate::tools::error::ToolError;
use crate::tools::gateway::{non_empty, require_caller, ToolGateway};
use crate::tools::operation::{EndSwarmArgs, SpawnSwarmArgs, UpdateSharedStateArgs, END_SWARM, SPAWN_SWARM};

const DEFAULT_END_REASON: &str = "Ended by request";

fn coded_error(code: &str, message: String) -> ToolResponse {
    ToolResponse::json(
        &json!({ "success": false, "error": code, "message": message }),
        true,
    )
}

fn parse_swarm_id(tool: &'static str, field: &str, raw: &str) -> Result<SwarmId, ToolError> {
    raw.trim()
        .parse()
        .map_err(|e| ToolError::invalid(tool, format!("{field} '{raw}' is not a valid id: {e}")))
}

impl ToolGateway {
    pub(crate) async fn spawn_swarm(
        &self,
        ctx: &CallContext,
        args: SpawnSwarmArgs,
    ) -> Result<ToolResponse, ToolError> {
        let caller = require_caller(ctx)?;

        let parent_id = match non_empty(args.parent_swarm_id) {
            Some(raw) => parse_swarm_id(SPAWN_SWARM, "parentSwarmId", &raw)?,
            None => ctx
                .swarm_id
                .or_else(|| self.swarms.resolve_active_swarm(&caller.user_id))
                .ok_or_else(|| ToolError::from_component(&SpawnError::NoActiveParent))?,
        };

        let request = SpawnRequest {
            goal: args.goal.trim().to_string(),
            team_id: non_empty(args.team_id),
            model_hint: non_empty(args.model_hint),
            initial_sub_tasks: args
                .initial_sub_tasks
                .into_iter()
                .filter(|task| !task.trim().is_empty())
                .collect(),
        };

        let outcome = self
            .swarms
            .spawn_child(caller, parent_id, request)
            .await
            .map_err(|e| ToolError::from_component(&e))?;

        let mut text = format!(
            "Swarm spawned successfully. Swarm ID: {}. Parent swarm: {}. Allocation: {}.",
            outcome.swarm_id, parent_id, outcome.allocation
        );
        if let Some(job_id) = &outcome.job_id {
            text.push_str(&format!(" Job ID: {job_id}."));
        }
        Ok(ToolResponse::text(text))
    }

    pub(crate) async fn update_swarm_shared_state(
        &self,
        ctx: &CallContext,
        args: UpdateSharedStateArgs,
    ) -> Result<ToolResponse, ToolError> {
        let update = match args.to_update() {
            Ok(update) => update,
            Err(err) => return Ok(coded_error(err.code(), err.to_string())),
        };
        let Some(conversation_id) = non_empty(args.conversation_id.clone())
            .map(ConversationId::new)
            .or_else(|| ctx.conversation_id.clone())
        else {
            return Ok(coded_error(
                "INVALID_SHARED_STATE_UPDATE",
                "conversationId is required outside a conversation".to_string(),
            ));
        };

        match self
            .conversations
            .update_swarm_shared_state(
                &conversation_id,
                update,
                args.expected_version,
                ctx.caller.as_ref(),
            )
            .await
        {
            Ok(result) => {
                if let Some(tasks) = &result.updated_sub_tasks {
                    let completed = tasks.iter().filter(|t| t.status.is_finished()).count();
                    self.swarms
                        .record_sub_tasks(&conversation_id, tasks.len() as u32, completed as u32)
                        .await;
                }
                let mut body = match serde_json::to_value(&result) {
                    Ok(Value::Object(map)) => map,
                    _ => serde_json::Map::new(),
                };
                body.insert("success".to_string(), Value::Bool(true));
                body.insert("conversationId".to_string(), json!(conversation_id));
                Ok(ToolResponse::json(&Value::Object(body), false))
            }
            Err(err) => Ok(coded_error(err.code(), err.to_string())),
        }
    }

    pub(crate) async fn end_swarm(
        &self,
        ctx: &CallContext,
        args: EndSwarmArgs,
    ) -> Result<ToolResponse, ToolError> {
        let swarm_id = match non_empty(args.swarm_id) {
            Some(raw) => Some(parse_swarm_id(END_SWARM, "swarmId", &raw)?),
            None => ctx.swarm_id.or_else(|| {
                ctx.caller
                    .as_ref()
                    .and_then(|caller| self.swarms.resolve_active_swarm(&caller.user_id))
            }),
        };
        let mode = args.mode.unwrap_or_default();
        let reason = non_empty(args.reason).unwrap_or_else(|| DEFAULT_END_REASON.to_string());

        match self
            .swarms
            .end_swarm(ctx.caller.as_ref(), swarm_id, mode, &reason)
            .await
        {
            Ok(final_state) => {
                let ended = swarm_id.map(|id| id.to_string()).unwrap_or_default();
                info!(swarm_id = %ended, mode = %final_state.mode, "Swarm ended through tool call");
                let mut message = format!("Swarm {ended} ended ({}).", final_state.mode);
                if let Some(note) = &final_state.note {
                    message.push(' ');
                    message.push_str(note);
                }
                Ok(ToolResponse::json(
                    &json!({
                        "success": true,
                        "swarmId": swarm_id,
                        "finalState": final_state,
                        "message": message,
                    }),
                    false,
                ))
            }
            Err(err) => Ok(coded_error(err.code(), err.to_string())),
        }
    }
}

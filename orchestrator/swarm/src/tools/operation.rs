// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Operations
//!
//! The closed set of operations the gateway understands. Each tool name maps
//! to exactly one [`ToolOperation`] variant carrying typed arguments, so the
//! gateway dispatches with an exhaustive `match` and an unknown name can only
//! surface as [`ToolError::UnknownTool`].
//!
//! | Tool | Arguments |
//! |------|-----------|
//! | `define_tool` | [`DefineToolArgs`] |
//! | `send_message` | [`SendMessageArgs`] |
//! | `resource_manage` | [`ResourceManageArgs`] |
//! | `run_routine` | [`RunRoutineArgs`] |
//! | `manage_run` | [`ManageRunArgs`] |
//! | `spawn_swarm` | [`SpawnSwarmArgs`] |
//! | `update_swarm_shared_state` | [`UpdateSharedStateArgs`] |
//! | `end_swarm` | [`EndSwarmArgs`] |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use loom_core::domain::conversation::{
    ConversationStateError, Scratchpad, SharedStateUpdate, SubTask, TeamConfig,
};
use loom_core::domain::run::RunMode;

use crate::domain::StopMode;
use crate::tools::error::ToolError;

pub const DEFINE_TOOL: &str = "define_tool";
pub const SEND_MESSAGE: &str = "send_message";
pub const RESOURCE_MANAGE: &str = "resource_manage";
pub const RUN_ROUTINE: &str = "run_routine";
pub const MANAGE_RUN: &str = "manage_run";
pub const SPAWN_SWARM: &str = "spawn_swarm";
pub const UPDATE_SWARM_SHARED_STATE: &str = "update_swarm_shared_state";
pub const END_SWARM: &str = "end_swarm";

pub const BUILTIN_TOOLS: [&str; 8] = [
    DEFINE_TOOL,
    SEND_MESSAGE,
    RESOURCE_MANAGE,
    RUN_ROUTINE,
    MANAGE_RUN,
    SPAWN_SWARM,
    UPDATE_SWARM_SHARED_STATE,
    END_SWARM,
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DefineToolArgs {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageArgs {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceOperation {
    Find,
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceManageArgs {
    pub operation: ResourceOperation,
    pub resource_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunRoutineArgs {
    pub routine_version_id: String,
    #[serde(default)]
    pub inputs: Value,
    /// Omitted: swarm-integrated when the caller has an active swarm.
    #[serde(default)]
    pub mode: Option<RunMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunAction {
    Status,
    Pause,
    Cancel,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManageRunArgs {
    pub run_id: String,
    pub action: RunAction,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpawnSwarmArgs {
    pub goal: String,
    #[serde(default)]
    pub parent_swarm_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub model_hint: Option<String>,
    #[serde(default)]
    pub initial_sub_tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubTasksPatch {
    #[serde(default)]
    pub upsert: Vec<SubTask>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScratchpadPatch {
    #[serde(default)]
    pub set: Scratchpad,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateSharedStateArgs {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sub_tasks: Option<SubTasksPatch>,
    #[serde(default)]
    pub shared_scratchpad: Option<ScratchpadPatch>,
    #[serde(default)]
    pub team_config: Option<TeamConfig>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl UpdateSharedStateArgs {
    /// The single facet update this call carries.
    pub fn to_update(&self) -> Result<SharedStateUpdate, ConversationStateError> {
        let facets = [
            self.sub_tasks.is_some(),
            self.shared_scratchpad.is_some(),
            self.team_config.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if facets != 1 {
            return Err(ConversationStateError::InvalidUpdate(format!(
                "exactly one of subTasks, sharedScratchpad or teamConfig must be given, got {facets}"
            )));
        }

        if let Some(patch) = &self.sub_tasks {
            return Ok(SharedStateUpdate::SubTasks {
                upsert: patch.upsert.clone(),
                remove: patch.remove.clone(),
            });
        }
        if let Some(patch) = &self.shared_scratchpad {
            return Ok(SharedStateUpdate::Scratchpad {
                set: patch.set.clone(),
                remove: patch.remove.clone(),
            });
        }
        match &self.team_config {
            Some(config) => Ok(SharedStateUpdate::TeamConfig(config.clone())),
            None => Err(ConversationStateError::InvalidUpdate(
                "no facet given".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndSwarmArgs {
    #[serde(default)]
    pub swarm_id: Option<String>,
    #[serde(default)]
    pub mode: Option<StopMode>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOperation {
    DefineTool(DefineToolArgs),
    SendMessage(SendMessageArgs),
    ResourceManage(ResourceManageArgs),
    RunRoutine(RunRoutineArgs),
    ManageRun(ManageRunArgs),
    SpawnSwarm(SpawnSwarmArgs),
    UpdateSwarmSharedState(UpdateSharedStateArgs),
    EndSwarm(EndSwarmArgs),
}

/// Catalogue entry describing a tool and its input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub builtin: bool,
}

impl ToolOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefineTool(_) => DEFINE_TOOL,
            Self::SendMessage(_) => SEND_MESSAGE,
            Self::ResourceManage(_) => RESOURCE_MANAGE,
            Self::RunRoutine(_) => RUN_ROUTINE,
            Self::ManageRun(_) => MANAGE_RUN,
            Self::SpawnSwarm(_) => SPAWN_SWARM,
            Self::UpdateSwarmSharedState(_) => UPDATE_SWARM_SHARED_STATE,
            Self::EndSwarm(_) => END_SWARM,
        }
    }

    pub fn is_builtin(name: &str) -> bool {
        BUILTIN_TOOLS.contains(&name)
    }

    /// Parse a tool call. `null` arguments are read as an empty object.
    pub fn parse(tool_name: &str, arguments: &Value) -> Result<Self, ToolError> {
        let arguments = if arguments.is_null() {
            Value::Object(Map::new())
        } else {
            arguments.clone()
        };

        Ok(match tool_name {
            DEFINE_TOOL => Self::DefineTool(args(DEFINE_TOOL, arguments)?),
            SEND_MESSAGE => Self::SendMessage(args(SEND_MESSAGE, arguments)?),
            RESOURCE_MANAGE => Self::ResourceManage(args(RESOURCE_MANAGE, arguments)?),
            RUN_ROUTINE => Self::RunRoutine(args(RUN_ROUTINE, arguments)?),
            MANAGE_RUN => Self::ManageRun(args(MANAGE_RUN, arguments)?),
            SPAWN_SWARM => Self::SpawnSwarm(args(SPAWN_SWARM, arguments)?),
            UPDATE_SWARM_SHARED_STATE => {
                Self::UpdateSwarmSharedState(args(UPDATE_SWARM_SHARED_STATE, arguments)?)
            }
            END_SWARM => Self::EndSwarm(args(END_SWARM, arguments)?),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        })
    }

    /// Every built-in tool with its fixed input schema.
    pub fn catalogue() -> Vec<ToolDescriptor> {
        BUILTIN_TOOLS
            .iter()
            .map(|name| {
                let (description, input_schema) = builtin_schema(name);
                ToolDescriptor {
                    name: name.to_string(),
                    description: description.to_string(),
                    input_schema,
                    builtin: true,
                }
            })
            .collect()
    }
}

fn args<T: DeserializeOwned>(tool: &'static str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::invalid(tool, e.to_string()))
}

fn builtin_schema(name: &str) -> (&'static str, Value) {
    match name {
        DEFINE_TOOL => (
            "Register a new tool with a JSON Schema for its input.",
            json!({
                "type": "object",
                "required": ["name", "description", "inputSchema"],
                "properties": {
                    "name": { "type": "string", "pattern": "^[a-z0-9_-]{1,64}$" },
                    "description": { "type": "string" },
                    "inputSchema": { "type": "object" }
                },
                "additionalProperties": false
            }),
        ),
        SEND_MESSAGE => (
            "Post a message to a conversation.",
            json!({
                "type": "object",
                "required": ["content"],
                "properties": {
                    "conversationId": { "type": "string" },
                    "content": { "type": "string", "minLength": 1 },
                    "role": { "type": "string", "enum": ["user", "assistant", "system"] }
                },
                "additionalProperties": false
            }),
        ),
        RESOURCE_MANAGE => (
            "Find, add, update or delete notes, projects, routines and standards.",
            json!({
                "type": "object",
                "required": ["operation", "resourceType"],
                "properties": {
                    "operation": { "type": "string", "enum": ["find", "add", "update", "delete"] },
                    "resourceType": { "type": "string", "enum": ["note", "project", "routine", "standard"] },
                    "id": { "type": "string" },
                    "attributes": { "type": "object" },
                    "filters": { "type": "object" }
                },
                "additionalProperties": false
            }),
        ),
        RUN_ROUTINE => (
            "Start a routine run, inside the active swarm when there is one.",
            json!({
                "type": "object",
                "required": ["routineVersionId"],
                "properties": {
                    "routineVersionId": { "type": "string" },
                    "inputs": { "type": "object" },
                    "mode": { "type": "string", "enum": ["standalone", "swarm-integrated"] }
                },
                "additionalProperties": false
            }),
        ),
        MANAGE_RUN => (
            "Query or control a live run.",
            json!({
                "type": "object",
                "required": ["runId", "action"],
                "properties": {
                    "runId": { "type": "string" },
                    "action": { "type": "string", "enum": ["status", "pause", "cancel", "resume"] },
                    "reason": { "type": "string" }
                },
                "additionalProperties": false
            }),
        ),
        SPAWN_SWARM => (
            "Spawn a child swarm from the active swarm.",
            json!({
                "type": "object",
                "required": ["goal"],
                "properties": {
                    "goal": { "type": "string", "minLength": 1 },
                    "parentSwarmId": { "type": "string" },
                    "teamId": { "type": "string" },
                    "modelHint": { "type": "string" },
                    "initialSubTasks": { "type": "array", "items": { "type": "string" } }
                },
                "additionalProperties": false
            }),
        ),
        UPDATE_SWARM_SHARED_STATE => (
            "Update exactly one facet of the conversation's shared swarm state.",
            json!({
                "type": "object",
                "properties": {
                    "conversationId": { "type": "string" },
                    "subTasks": {
                        "type": "object",
                        "properties": {
                            "upsert": { "type": "array" },
                            "remove": { "type": "array", "items": { "type": "string" } }
                        }
                    },
                    "sharedScratchpad": {
                        "type": "object",
                        "properties": {
                            "set": { "type": "object" },
                            "remove": { "type": "array", "items": { "type": "string" } }
                        }
                    },
                    "teamConfig": { "type": "object" },
                    "expectedVersion": { "type": "integer", "minimum": 0 }
                },
                "additionalProperties": false
            }),
        ),
        _ => (
            "End a swarm. Only graceful termination is applied.",
            json!({
                "type": "object",
                "properties": {
                    "swarmId": { "type": "string" },
                    "mode": { "type": "string", "enum": ["graceful", "force"] },
                    "reason": { "type": "string" }
                },
                "additionalProperties": false
            }),
        ),
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `define_tool`, `send_message` and `resource_manage`.
//!
//! These talk straight to the persistence collaborator. Its failures are
//! passed through with their original message.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use loom_core::domain::conversation::ConversationId;
use loom_core::domain::error::ErrorKind;
use loom_core::domain::events::ConversationEvent;
use loom_core::domain::identity::CallerIdentity;
use loom_core::domain::repository::{PersistenceError, ResourceKind, StoredRecord};

use crate::tools::envelope::{CallContext, ToolResponse};
use crate::tools::error::ToolError;
use crate::tools::gateway::{non_empty, require_caller, ToolGateway};
use crate::tools::operation::{
    DefineToolArgs, ResourceManageArgs, ResourceOperation, SendMessageArgs, ToolOperation,
    DEFINE_TOOL, RESOURCE_MANAGE, SEND_MESSAGE,
};

const MAX_TOOL_NAME_LEN: usize = 64;
const MESSAGE_ROLES: [&str; 3] = ["user", "assistant", "system"];
const OWNER_FIELD: &str = "ownerId";

fn persistence(err: PersistenceError) -> ToolError {
    ToolError::from_component(&err)
}

fn valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

impl ToolGateway {
    pub(crate) async fn define_tool(
        &self,
        ctx: &CallContext,
        args: DefineToolArgs,
    ) -> Result<ToolResponse, ToolError> {
        let caller = require_caller(ctx)?;
        let name = args.name.trim();
        if !valid_tool_name(name) {
            return Err(ToolError::invalid(
                DEFINE_TOOL,
                format!("name '{name}' must be 1-{MAX_TOOL_NAME_LEN} characters of a-z, 0-9, '_' or '-'"),
            ));
        }
        if ToolOperation::is_builtin(name) {
            return Err(ToolError::invalid(
                DEFINE_TOOL,
                format!("name '{name}' collides with a built-in tool"),
            ));
        }
        if args.description.trim().is_empty() {
            return Err(ToolError::invalid(DEFINE_TOOL, "description must not be empty"));
        }
        if !args.input_schema.is_object() {
            return Err(ToolError::invalid(DEFINE_TOOL, "inputSchema must be a JSON object"));
        }
        jsonschema::validator_for(&args.input_schema).map_err(|e| {
            ToolError::invalid(DEFINE_TOOL, format!("inputSchema is not a valid JSON Schema: {e}"))
        })?;

        let data = json!({
            "name": name,
            "description": args.description.trim(),
            "inputSchema": args.input_schema,
            "ownerId": caller.user_id,
        });
        match self
            .persistence
            .create(ResourceKind::ToolDefinition, name, data)
            .await
        {
            Ok(_) => {
                info!(tool = name, owner = %caller.user_id, "Tool defined");
                Ok(ToolResponse::text(format!("Tool {name} defined successfully.")))
            }
            Err(PersistenceError::Conflict { .. }) => Err(ToolError::failed(
                ErrorKind::InvalidState,
                format!("Tool {name} is already defined"),
            )),
            Err(err) => Err(persistence(err)),
        }
    }

    pub(crate) async fn send_message(
        &self,
        ctx: &CallContext,
        args: SendMessageArgs,
    ) -> Result<ToolResponse, ToolError> {
        let caller = require_caller(ctx)?;
        let conversation_id = non_empty(args.conversation_id)
            .map(ConversationId::new)
            .or_else(|| ctx.conversation_id.clone())
            .ok_or_else(|| {
                ToolError::invalid(SEND_MESSAGE, "conversationId is required outside a conversation")
            })?;
        let content = args.content.trim();
        if content.is_empty() {
            return Err(ToolError::invalid(SEND_MESSAGE, "content must not be empty"));
        }
        let role = non_empty(args.role).unwrap_or_else(|| "assistant".to_string());
        if !MESSAGE_ROLES.contains(&role.as_str()) {
            return Err(ToolError::invalid(
                SEND_MESSAGE,
                format!("role '{role}' must be one of {}", MESSAGE_ROLES.join(", ")),
            ));
        }

        self.persistence
            .read(ResourceKind::Chat, conversation_id.as_str())
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                ToolError::failed(
                    ErrorKind::NotFound,
                    format!("Conversation {conversation_id} not found"),
                )
            })?;

        let message_id = Uuid::new_v4().to_string();
        let posted_at = Utc::now();
        self.persistence
            .create(
                ResourceKind::ChatMessage,
                &message_id,
                json!({
                    "chatId": conversation_id,
                    "content": content,
                    "role": role,
                    "authorId": caller.user_id,
                    "createdAt": posted_at,
                }),
            )
            .await
            .map_err(persistence)?;

        self.event_bus
            .publish_conversation_event(ConversationEvent::MessagePosted {
                conversation_id: conversation_id.clone(),
                message_id: message_id.clone(),
                author: caller.user_id.clone(),
                posted_at,
            });
        Ok(ToolResponse::text(format!(
            "Message {message_id} posted to conversation {conversation_id}."
        )))
    }

    pub(crate) async fn resource_manage(
        &self,
        ctx: &CallContext,
        args: ResourceManageArgs,
    ) -> Result<ToolResponse, ToolError> {
        let caller = require_caller(ctx)?;
        let kind: ResourceKind = args
            .resource_type
            .trim()
            .parse()
            .map_err(|e| ToolError::invalid(RESOURCE_MANAGE, format!("resourceType: {e}")))?;
        if !kind.is_user_manageable() {
            return Err(ToolError::failed(
                ErrorKind::Unauthorized,
                format!("Resource type {kind} cannot be managed through {RESOURCE_MANAGE}"),
            ));
        }

        match args.operation {
            ResourceOperation::Find => {
                let mut filter = args.filters.unwrap_or_default();
                filter.insert(OWNER_FIELD.to_string(), json!(caller.user_id));
                let records = self
                    .persistence
                    .find(kind, &filter)
                    .await
                    .map_err(persistence)?;
                Ok(ToolResponse::json(
                    &json!({ "count": records.len(), "records": records }),
                    false,
                ))
            }
            ResourceOperation::Add => {
                let mut attributes = args.attributes.ok_or_else(|| {
                    ToolError::invalid(RESOURCE_MANAGE, "attributes are required for add")
                })?;
                if let Some(owner) = attributes.get(OWNER_FIELD) {
                    if owner != &json!(caller.user_id) {
                        return Err(ToolError::invalid(
                            RESOURCE_MANAGE,
                            "attributes.ownerId must be the caller",
                        ));
                    }
                }
                attributes.insert(OWNER_FIELD.to_string(), json!(caller.user_id));
                let id = non_empty(args.id).unwrap_or_else(|| Uuid::new_v4().to_string());
                let record = self
                    .persistence
                    .create(kind, &id, Value::Object(attributes))
                    .await
                    .map_err(persistence)?;
                info!(kind = %kind, id = %record.id, owner = %caller.user_id, "Resource added");
                Ok(ToolResponse::json(&json!(record), false))
            }
            ResourceOperation::Update => {
                let id = required_id(args.id, "update")?;
                let attributes = args.attributes.ok_or_else(|| {
                    ToolError::invalid(RESOURCE_MANAGE, "attributes are required for update")
                })?;
                let existing = self.owned_record(caller, kind, &id).await?;
                if let Some(owner) = attributes.get(OWNER_FIELD) {
                    if owner.as_str() != existing.data_str(OWNER_FIELD) {
                        return Err(ToolError::invalid(
                            RESOURCE_MANAGE,
                            "attributes.ownerId cannot be changed",
                        ));
                    }
                }
                let record = self
                    .persistence
                    .update(kind, &id, Value::Object(attributes))
                    .await
                    .map_err(persistence)?;
                Ok(ToolResponse::json(&json!(record), false))
            }
            ResourceOperation::Delete => {
                let id = required_id(args.id, "delete")?;
                self.owned_record(caller, kind, &id).await?;
                self.persistence.delete(kind, &id).await.map_err(persistence)?;
                info!(kind = %kind, id = %id, "Resource deleted");
                Ok(ToolResponse::text(format!("Deleted {kind} {id}.")))
            }
        }
    }

    /// Read a record the caller owns (or may administer).
    async fn owned_record(
        &self,
        caller: &CallerIdentity,
        kind: ResourceKind,
        id: &str,
    ) -> Result<StoredRecord, ToolError> {
        let record = self
            .persistence
            .read(kind, id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                persistence(PersistenceError::NotFound {
                    kind,
                    id: id.to_string(),
                })
            })?;
        let owned = record.data_str(OWNER_FIELD) == Some(caller.user_id.as_str());
        if !owned && !caller.has_admin_privilege(self.admins.as_ref()).await {
            return Err(ToolError::failed(
                ErrorKind::Unauthorized,
                format!("User {} does not own {kind} {id}", caller.user_id),
            ));
        }
        Ok(record)
    }
}

fn required_id(id: Option<String>, operation: &str) -> Result<String, ToolError> {
    non_empty(id)
        .ok_or_else(|| ToolError::invalid(RESOURCE_MANAGE, format!("id is required for {operation}")))
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool call wire envelope.
//!
//! Request: `{ "toolName": "...", "arguments": { ... } }`
//! Response: `{ "isError": false, "content": [{ "type": "text", "text": "..." }] }`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use loom_core::domain::conversation::ConversationId;
use loom_core::domain::identity::CallerIdentity;
use loom_core::domain::run::RunId;
use loom_core::domain::swarm_context::SwarmId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub is_error: bool,
    pub content: Vec<ToolContent>,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    /// Structured body rendered as JSON text.
    pub fn json(body: &Value, is_error: bool) -> Self {
        let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        Self {
            is_error,
            content: vec![ToolContent::Text { text }],
        }
    }

    /// All text blocks joined by newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the text content as JSON, if it is JSON.
    pub fn json_content(&self) -> Option<Value> {
        serde_json::from_str(&self.text_content()).ok()
    }
}

/// Who is calling and from where. Built by the transport from the
/// authenticated session; never taken from tool arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Option<CallerIdentity>,
    pub conversation_id: Option<ConversationId>,
    pub swarm_id: Option<SwarmId>,
    pub run_id: Option<RunId>,
}

impl CallContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_caller(caller: CallerIdentity) -> Self {
        Self {
            caller: Some(caller),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_swarm(mut self, swarm_id: SwarmId) -> Self {
        self.swarm_id = Some(swarm_id);
        self
    }

    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape() {
        let response = ToolResponse::error("Unknown tool: nope");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "isError": true,
                "content": [{ "type": "text", "text": "Unknown tool: nope" }]
            })
        );
    }

    #[test]
    fn test_request_without_arguments() {
        let request: ToolCallRequest = serde_json::from_value(json!({ "toolName": "end_swarm" })).unwrap();
        assert_eq!(request.tool_name, "end_swarm");
        assert!(request.arguments.is_null());
    }

    #[test]
    fn test_json_content_round_trip() {
        let response = ToolResponse::json(&json!({ "success": true }), false);
        assert_eq!(response.json_content(), Some(json!({ "success": true })));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use loom_core::domain::approval::ToolApprovalRequest;
use loom_swarm::tools::operation::ToolDescriptor;
use loom_swarm::tools::ToolResponse;
use loom_swarm::application::service::SpawnOutcome;
use loom_swarm::SpawnRequest;

use super::base_url;
use super::server::{ADMIN_HEADER, USER_HEADER};

/// Identity forwarded to the daemon on every request.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentity {
    pub user_id: Option<String>,
    pub admin: bool,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
    identity: ClientIdentity,
}

/// Scope attached to a tool call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16, identity: ClientIdentity) -> Result<Self> {
        // Gated tool calls can wait on a human, so no global timeout
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url(host, port),
            identity,
        })
    }

    fn with_identity(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.identity.user_id {
            Some(user_id) => request.header(USER_HEADER, user_id),
            None => request,
        };
        if self.identity.admin {
            request.header(ADMIN_HEADER, "true")
        } else {
            request
        }
    }

    async fn checked(response: Response, action: &str) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to {} ({}): {}", action, status, error_text);
        }
        Ok(response)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let response = self
            .client
            .get(format!("{}/v1/tools", self.base_url))
            .send()
            .await
            .context("Failed to list tools")?;

        Self::checked(response, "list tools")
            .await?
            .json()
            .await
            .context("Failed to parse tool catalogue")
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        scope: CallScope,
    ) -> Result<ToolResponse> {
        let mut body = json!({ "toolName": tool_name, "arguments": arguments });
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), json!(scope)) {
            target.extend(extra);
        }

        let response = self
            .with_identity(self.client.post(format!("{}/v1/tools/call", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("Failed to call tool")?;

        Self::checked(response, "call tool")
            .await?
            .json()
            .await
            .context("Failed to parse tool response")
    }

    pub async fn start_swarm(
        &self,
        conversation_id: &str,
        request: SpawnRequest,
    ) -> Result<SpawnOutcome> {
        let mut body = json!(request);
        if let Some(map) = body.as_object_mut() {
            map.insert("conversationId".to_string(), json!(conversation_id));
        }

        let response = self
            .with_identity(self.client.post(format!("{}/v1/swarms", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("Failed to start swarm")?;

        Self::checked(response, "start swarm")
            .await?
            .json()
            .await
            .context("Failed to parse swarm response")
    }

    pub async fn list_approvals(&self) -> Result<Vec<ToolApprovalRequest>> {
        let response = self
            .with_identity(self.client.get(format!("{}/v1/approvals", self.base_url)))
            .send()
            .await
            .context("Failed to list approvals")?;

        Self::checked(response, "list approvals")
            .await?
            .json()
            .await
            .context("Failed to parse approvals")
    }

    pub async fn grant_approval(&self, approval_id: Uuid, conversation_id: &str) -> Result<Value> {
        let response = self
            .with_identity(
                self.client
                    .post(format!("{}/v1/approvals/{}/grant", self.base_url, approval_id)),
            )
            .json(&json!({ "conversationId": conversation_id }))
            .send()
            .await
            .context("Failed to grant approval")?;

        Self::checked(response, "grant approval")
            .await?
            .json()
            .await
            .context("Failed to parse approval response")
    }

    pub async fn reject_approval(
        &self,
        approval_id: Uuid,
        conversation_id: &str,
        reason: Option<String>,
    ) -> Result<Value> {
        let response = self
            .with_identity(
                self.client
                    .post(format!("{}/v1/approvals/{}/reject", self.base_url, approval_id)),
            )
            .json(&json!({ "conversationId": conversation_id, "reason": reason }))
            .send()
            .await
            .context("Failed to reject approval")?;

        Self::checked(response, "reject approval")
            .await?
            .json()
            .await
            .context("Failed to parse approval response")
    }
}

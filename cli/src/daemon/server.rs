// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server
//!
//! Exposes the tool gateway and the handful of control operations that are
//! driven by chat or by a human reviewer rather than by an agent.
//!
//! Caller identity is read from the `x-loom-user-id` and `x-loom-admin`
//! headers. They stand in for a session established by an upstream
//! authenticating proxy; the daemon performs no authentication itself.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

use loom_core::domain::approval::{ApprovalDecision, ApprovalId};
use loom_core::domain::conversation::{ConversationConfig, ConversationId};
use loom_core::domain::error::{Classify, ErrorKind};
use loom_core::domain::identity::{CallerIdentity, UserId};
use loom_core::domain::node_config::NodeConfigManifest;
use loom_core::domain::run::RunId;
use loom_swarm::tools::{CallContext, ToolCallRequest};
use loom_swarm::{Orchestrator, SpawnRequest, SwarmId};

pub const USER_HEADER: &str = "x-loom-user-id";
pub const ADMIN_HEADER: &str = "x-loom-admin";

const DEFAULT_REJECT_REASON: &str = "Rejected by reviewer";

pub async fn start_daemon(config: NodeConfigManifest) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    if config.spec.metrics.enabled {
        install_metrics_exporter(config.spec.metrics.port)?;
    }

    let orchestrator = Arc::new(Orchestrator::in_memory(&config));
    let app = router(orchestrator);

    let addr = format!("{}:{}", config.spec.server.bind_address, config.spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(node = %config.metadata.name, "Daemon listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Daemon shutting down");
    Ok(())
}

fn install_metrics_exporter(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    start_time: Instant,
}

/// Build the HTTP router around an orchestrator.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState {
        orchestrator,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/tools", get(list_tools_handler))
        .route("/v1/tools/call", post(call_tool_handler))
        .route("/v1/swarms", post(start_swarm_handler))
        .route("/v1/conversations/{conversation_id}", put(put_conversation_handler))
        .route("/v1/approvals", get(list_approvals_handler))
        .route("/v1/approvals/{approval_id}/grant", post(grant_approval_handler))
        .route("/v1/approvals/{approval_id}/reject", post(reject_approval_handler))
        .route("/v1/runs/{run_id}/steps", post(record_run_step_handler))
        .route("/v1/runs/{run_id}/complete", post(complete_run_handler))
        .route("/v1/runs/{run_id}/fail", post(fail_run_handler))
        .with_state(Arc::new(state))
}

/// Error body for the non-gateway routes: `{ "error": <kind>, "message": .. }`.
#[derive(Debug)]
struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn from_component<E: Classify + Display>(err: &E) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    fn unauthenticated() -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            message: format!("missing {USER_HEADER} header"),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind);
        if status.is_server_error() {
            warn!(kind = %self.kind, "Request failed: {}", self.message);
        }
        (
            status,
            Json(json!({ "error": self.kind.as_str(), "message": self.message })),
        )
            .into_response()
    }
}

/// Caller identity from the forwarded session headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Option<CallerIdentity> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())?;
    let is_admin = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| matches!(v.trim(), "true" | "1"));
    Some(CallerIdentity {
        user_id: UserId::new(user_id),
        is_admin,
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "healthy",
        "node": orchestrator.config.metadata.name,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "activeRuns": orchestrator.runs.len(),
        "activeSwarms": orchestrator.swarms.registry().len(),
    }))
}

async fn list_tools_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.orchestrator.gateway.list_tools().await).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolBody {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub swarm_id: Option<SwarmId>,
    #[serde(default)]
    pub run_id: Option<RunId>,
}

/// Always answers 200: tool failures travel inside the envelope.
async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CallToolBody>,
) -> Response {
    let ctx = CallContext {
        caller: caller_from_headers(&headers),
        conversation_id: body.conversation_id,
        swarm_id: body.swarm_id,
        run_id: body.run_id,
    };
    let response = state
        .orchestrator
        .gateway
        .call(&ctx, ToolCallRequest::new(body.tool_name, body.arguments))
        .await;
    Json(response).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSwarmBody {
    pub conversation_id: ConversationId,
    #[serde(flatten)]
    pub request: SpawnRequest,
}

async fn start_swarm_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StartSwarmBody>,
) -> Result<Response, ApiError> {
    let caller = caller_from_headers(&headers).ok_or_else(ApiError::unauthenticated)?;
    let outcome = state
        .orchestrator
        .start_swarm(&caller, body.conversation_id, body.request)
        .await
        .map_err(|e| ApiError::from_component(&e))?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

async fn put_conversation_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(config): Json<ConversationConfig>,
) -> Result<Response, ApiError> {
    caller_from_headers(&headers).ok_or_else(ApiError::unauthenticated)?;
    let conversation = state
        .orchestrator
        .conversations
        .insert(ConversationId::new(conversation_id), config)
        .await
        .map_err(|e| ApiError::from_component(&e))?;
    Ok(Json(conversation).into_response())
}

async fn list_approvals_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.orchestrator.approvals.list_pending().await).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveApprovalBody {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn grant_approval_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
    Json(body): Json<ResolveApprovalBody>,
) -> Result<Response, ApiError> {
    let by = caller_from_headers(&headers).map(|c| c.user_id);
    resolve_approval(
        &state,
        approval_id,
        &body.conversation_id,
        ApprovalDecision::Grant { by },
    )
    .await
}

async fn reject_approval_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(approval_id): Path<Uuid>,
    Json(body): Json<ResolveApprovalBody>,
) -> Result<Response, ApiError> {
    let by = caller_from_headers(&headers).map(|c| c.user_id);
    let reason = body
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REJECT_REASON.to_string());
    resolve_approval(
        &state,
        approval_id,
        &body.conversation_id,
        ApprovalDecision::Reject { by, reason },
    )
    .await
}

/// Decisions naming another conversation are dropped and answered with 202.
async fn resolve_approval(
    state: &AppState,
    approval_id: Uuid,
    conversation_id: &ConversationId,
    decision: ApprovalDecision,
) -> Result<Response, ApiError> {
    let outcome = state
        .orchestrator
        .approvals
        .resolve_for_conversation(conversation_id, ApprovalId(approval_id), decision)
        .await;
    match outcome {
        Some(result) => {
            let status = result.map_err(|e| ApiError::from_component(&e))?;
            Ok(Json(json!({ "approvalId": approval_id, "result": status })).into_response())
        }
        None => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "approvalId": approval_id, "ignored": true })),
        )
            .into_response()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunStepBody {
    #[serde(default)]
    pub credits: u64,
}

/// Worker callback: one step of the run finished.
async fn record_run_step_handler(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<RunStepBody>,
) -> Result<Response, ApiError> {
    let run_id = RunId(run_id);
    let step = state
        .orchestrator
        .runs
        .record_step(&run_id, body.credits)
        .await
        .map_err(|e| ApiError::from_component(&e))?;
    Ok(Json(json!({ "runId": run_id, "stepCursor": step })).into_response())
}

async fn complete_run_handler(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let transition = state
        .orchestrator
        .runs
        .complete(&RunId(run_id))
        .await
        .map_err(|e| ApiError::from_component(&e))?;
    Ok(Json(transition).into_response())
}

#[derive(Debug, Deserialize)]
pub struct FailRunBody {
    pub message: String,
}

async fn fail_run_handler(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<FailRunBody>,
) -> Result<Response, ApiError> {
    let transition = state
        .orchestrator
        .runs
        .fail(&RunId(run_id), body.message)
        .await
        .map_err(|e| ApiError::from_component(&e))?;
    Ok(Json(transition).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(caller_from_headers(&headers).is_none());

        headers.insert(USER_HEADER, HeaderValue::from_static("  "));
        assert!(caller_from_headers(&headers).is_none());

        headers.insert(USER_HEADER, HeaderValue::from_static("alice"));
        let caller = caller_from_headers(&headers).unwrap();
        assert_eq!(caller.user_id.as_str(), "alice");
        assert!(!caller.is_admin);

        headers.insert(ADMIN_HEADER, HeaderValue::from_static("true"));
        assert!(caller_from_headers(&headers).unwrap().is_admin);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::NotImplemented), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }
}

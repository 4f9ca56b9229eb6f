// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool Approval Service - human-in-the-loop gate for sensitive tool calls
//!
//! Each request lives in a pending table together with the completion channel
//! of its waiter. Resolution (grant, reject, timeout, cancel) removes it from
//! the table, records the terminal status and wakes the waiter. A per-request
//! timer task enforces the timeout so a waiter never blocks indefinitely; it
//! is aborted as soon as the request resolves by any other path. Only the most
//! recent resolutions are remembered for duplicate detection.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::domain::approval::{
    ApprovalContext, ApprovalDecision, ApprovalError, ApprovalId, ApprovalStatus,
    ToolApprovalRequest,
};
use crate::domain::conversation::ConversationId;
use crate::domain::events::ApprovalEvent;
use crate::domain::identity::UserId;
use crate::infrastructure::event_bus::EventBus;

/// Resolved requests remembered before the oldest is forgotten.
pub const DEFAULT_RESOLVED_CAPACITY: usize = 1024;

#[derive(Debug)]
struct PendingApproval {
    request: ToolApprovalRequest,
    response_tx: oneshot::Sender<ApprovalStatus>,
    timer: Option<AbortHandle>,
}

struct ApprovalTables {
    pending: HashMap<ApprovalId, PendingApproval>,
    resolved: HashMap<ApprovalId, (ToolApprovalRequest, ApprovalStatus)>,
    resolved_order: VecDeque<ApprovalId>,
    resolved_capacity: usize,
}

impl ApprovalTables {
    fn new(resolved_capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            resolved: HashMap::new(),
            resolved_order: VecDeque::new(),
            resolved_capacity: resolved_capacity.max(1),
        }
    }

    fn remember(&mut self, request: ToolApprovalRequest, status: ApprovalStatus) {
        let id = request.id;
        if self.resolved.insert(id, (request, status)).is_none() {
            self.resolved_order.push_back(id);
        }
        while self.resolved_order.len() > self.resolved_capacity {
            if let Some(oldest) = self.resolved_order.pop_front() {
                self.resolved.remove(&oldest);
            }
        }
    }
}

/// Waiter side of an opened approval request.
#[derive(Debug)]
pub struct ApprovalTicket {
    pub request: ToolApprovalRequest,
    response_rx: oneshot::Receiver<ApprovalStatus>,
}

impl ApprovalTicket {
    /// Wait for the terminal status. A dropped sender counts as a timeout.
    pub async fn wait(self) -> ApprovalStatus {
        match self.response_rx.await {
            Ok(status) => status,
            Err(_) => ApprovalStatus::TimedOut { at: Utc::now() },
        }
    }
}

/// Approval service for gated tool calls
pub struct ApprovalService {
    tables: Arc<RwLock<ApprovalTables>>,
    event_bus: EventBus,
    default_timeout: Duration,
}

impl ApprovalService {
    pub fn new(event_bus: EventBus, default_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(ApprovalTables::new(DEFAULT_RESOLVED_CAPACITY))),
            event_bus,
            default_timeout,
        }
    }

    /// Bound the history of resolved requests. Call before any request is opened.
    pub fn with_resolved_capacity(mut self, capacity: usize) -> Self {
        self.tables = Arc::new(RwLock::new(ApprovalTables::new(capacity)));
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register a pending request and start its timeout timer.
    pub async fn open(
        &self,
        context: ApprovalContext,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        requested_by: UserId,
        timeout: Option<Duration>,
    ) -> ApprovalTicket {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let request = ToolApprovalRequest {
            id: ApprovalId::new(),
            context,
            tool_name: tool_name.into(),
            arguments,
            requested_by,
            created_at: Utc::now(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        let request_id = request.id;
        let (tx, rx) = oneshot::channel();

        {
            // The timer cannot observe the table before its handle is stored.
            let mut tables = self.tables.write().await;
            let timer = spawn_timeout(
                self.tables.clone(),
                self.event_bus.clone(),
                request_id,
                timeout,
            );
            tables.pending.insert(
                request_id,
                PendingApproval {
                    request: request.clone(),
                    response_tx: tx,
                    timer: Some(timer),
                },
            );
        }

        info!(
            approval_id = %request_id,
            tool = %request.tool_name,
            conversation_id = %request.context.conversation_id,
            timeout_ms = request.timeout_ms,
            "Tool approval requested"
        );
        self.event_bus.publish_approval_event(ApprovalEvent::ApprovalRequested {
            request: request.clone(),
        });

        ApprovalTicket {
            request,
            response_rx: rx,
        }
    }

    /// Open a request and wait until it is resolved or times out.
    pub async fn request_approval(
        &self,
        context: ApprovalContext,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        requested_by: UserId,
        timeout: Option<Duration>,
    ) -> ApprovalStatus {
        self.open(context, tool_name, arguments, requested_by, timeout)
            .await
            .wait()
            .await
    }

    pub async fn grant(
        &self,
        id: ApprovalId,
        by: Option<UserId>,
    ) -> Result<ApprovalStatus, ApprovalError> {
        self.resolve(id, ApprovalDecision::Grant { by }).await
    }

    pub async fn reject(
        &self,
        id: ApprovalId,
        by: Option<UserId>,
        reason: impl Into<String>,
    ) -> Result<ApprovalStatus, ApprovalError> {
        self.resolve(
            id,
            ApprovalDecision::Reject {
                by,
                reason: reason.into(),
            },
        )
        .await
    }

    /// Apply a decision that arrived through a conversation-scoped channel.
    ///
    /// Returns `None` when the request belongs to another conversation; such
    /// decisions are dropped without touching the request.
    pub async fn resolve_for_conversation(
        &self,
        conversation_id: &ConversationId,
        id: ApprovalId,
        decision: ApprovalDecision,
    ) -> Option<Result<ApprovalStatus, ApprovalError>> {
        {
            let tables = self.tables.read().await;
            let owner = tables
                .pending
                .get(&id)
                .map(|p| &p.request.context.conversation_id)
                .or_else(|| tables.resolved.get(&id).map(|(r, _)| &r.context.conversation_id));
            if let Some(owner) = owner {
                if owner != conversation_id {
                    debug!(
                        approval_id = %id,
                        expected = %owner,
                        received = %conversation_id,
                        "Ignoring approval decision for another conversation"
                    );
                    return None;
                }
            }
        }
        Some(self.resolve(id, decision).await)
    }

    pub async fn resolve(
        &self,
        id: ApprovalId,
        decision: ApprovalDecision,
    ) -> Result<ApprovalStatus, ApprovalError> {
        let mut tables = self.tables.write().await;

        let Some(pending) = tables.pending.remove(&id) else {
            return Err(match tables.resolved.get(&id) {
                Some((_, status)) => ApprovalError::AlreadyResolved {
                    id,
                    status: status.label(),
                },
                None => ApprovalError::NotFound(id),
            });
        };

        let status = match decision {
            ApprovalDecision::Grant { by } => {
                info!(approval_id = %id, granted_by = ?by, "Tool approval granted");
                ApprovalStatus::Granted { by, at: Utc::now() }
            }
            ApprovalDecision::Reject { by, reason } => {
                info!(approval_id = %id, rejected_by = ?by, reason = %reason, "Tool approval rejected");
                ApprovalStatus::Rejected {
                    by,
                    reason,
                    at: Utc::now(),
                }
            }
        };

        finish(&mut tables, &self.event_bus, pending, status.clone());
        Ok(status)
    }

    /// Cancel a pending request; the waiter observes a timeout.
    pub async fn cancel(&self, id: ApprovalId) -> Result<(), ApprovalError> {
        let mut tables = self.tables.write().await;
        match tables.pending.remove(&id) {
            Some(pending) => {
                debug!(approval_id = %id, "Tool approval request cancelled");
                finish(
                    &mut tables,
                    &self.event_bus,
                    pending,
                    ApprovalStatus::TimedOut { at: Utc::now() },
                );
                Ok(())
            }
            None => Err(ApprovalError::NotFound(id)),
        }
    }

    pub async fn list_pending(&self) -> Vec<ToolApprovalRequest> {
        let tables = self.tables.read().await;
        let mut pending: Vec<_> = tables.pending.values().map(|p| p.request.clone()).collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    pub async fn get(&self, id: ApprovalId) -> Option<(ToolApprovalRequest, ApprovalStatus)> {
        let tables = self.tables.read().await;
        if let Some(pending) = tables.pending.get(&id) {
            return Some((pending.request.clone(), ApprovalStatus::Pending));
        }
        tables.resolved.get(&id).cloned()
    }
}

fn spawn_timeout(
    tables: Arc<RwLock<ApprovalTables>>,
    event_bus: EventBus,
    request_id: ApprovalId,
    timeout: Duration,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;

        let mut guard = tables.write().await;
        if let Some(mut pending) = guard.pending.remove(&request_id) {
            warn!(approval_id = %request_id, "Tool approval request timed out");
            pending.timer = None;
            let status = ApprovalStatus::TimedOut { at: Utc::now() };
            finish(&mut guard, &event_bus, pending, status);
        }
    })
    .abort_handle()
}

fn finish(
    tables: &mut ApprovalTables,
    event_bus: &EventBus,
    pending: PendingApproval,
    status: ApprovalStatus,
) {
    let PendingApproval {
        request,
        response_tx,
        timer,
    } = pending;
    if let Some(timer) = timer {
        timer.abort();
    }

    metrics::counter!("loom_approvals_total", "outcome" => status.label()).increment(1);
    event_bus.publish_approval_event(ApprovalEvent::ApprovalResolved {
        approval_id: request.id,
        conversation_id: request.context.conversation_id.clone(),
        status: status.label().to_string(),
        resolved_at: Utc::now(),
    });

    // Waiter may have gone away
    let _ = response_tx.send(status.clone());
    tables.remember(request, status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(conversation: &str) -> ApprovalContext {
        ApprovalContext {
            conversation_id: ConversationId::new(conversation),
            run_id: None,
            swarm_id: None,
        }
    }

    fn service() -> Arc<ApprovalService> {
        Arc::new(ApprovalService::new(EventBus::new(16), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_grant_flow() {
        let service = service();
        let ticket = service
            .open(context("chat-1"), "resource_manage", json!({}), UserId::new("alice"), None)
            .await;
        let id = ticket.request.id;

        let approver = service.clone();
        tokio::spawn(async move {
            approver.grant(id, Some(UserId::new("bob"))).await.unwrap();
        });

        match ticket.wait().await {
            ApprovalStatus::Granted { by, .. } => assert_eq!(by, Some(UserId::new("bob"))),
            other => panic!("Expected grant, got {other:?}"),
        }
        assert!(service.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_flow() {
        let service = service();
        let ticket = service
            .open(context("chat-1"), "resource_manage", json!({}), UserId::new("alice"), None)
            .await;
        service
            .reject(ticket.request.id, None, "Security concerns")
            .await
            .unwrap();

        match ticket.wait().await {
            ApprovalStatus::Rejected { reason, .. } => assert_eq!(reason, "Security concerns"),
            other => panic!("Expected rejection, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_flow() {
        let service = service();
        let status = service
            .request_approval(
                context("chat-1"),
                "resource_manage",
                json!({}),
                UserId::new("alice"),
                Some(Duration::from_secs(1)),
            )
            .await;
        assert!(matches!(status, ApprovalStatus::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_resolved_request_is_never_reused() {
        let service = service();
        let ticket = service
            .open(context("chat-1"), "send_message", json!({}), UserId::new("alice"), None)
            .await;
        let id = ticket.request.id;
        service.grant(id, None).await.unwrap();

        let err = service.reject(id, None, "too late").await.unwrap_err();
        assert_eq!(
            err,
            ApprovalError::AlreadyResolved {
                id,
                status: "granted"
            }
        );
        assert!(matches!(
            service.get(id).await,
            Some((_, ApprovalStatus::Granted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_mismatched_conversation_is_ignored() {
        let service = service();
        let ticket = service
            .open(context("chat-1"), "send_message", json!({}), UserId::new("alice"), None)
            .await;
        let id = ticket.request.id;

        let outcome = service
            .resolve_for_conversation(
                &ConversationId::new("chat-2"),
                id,
                ApprovalDecision::Grant { by: None },
            )
            .await;
        assert!(outcome.is_none());
        assert_eq!(service.list_pending().await.len(), 1);

        let outcome = service
            .resolve_for_conversation(
                &ConversationId::new("chat-1"),
                id,
                ApprovalDecision::Grant { by: None },
            )
            .await;
        assert!(matches!(outcome, Some(Ok(ApprovalStatus::Granted { .. }))));
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let service = service();
        let id = ApprovalId::new();
        assert_eq!(service.grant(id, None).await, Err(ApprovalError::NotFound(id)));
        assert_eq!(service.cancel(id).await, Err(ApprovalError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_grant_aborts_timeout_timer() {
        let service = service();
        let ticket = service
            .open(context("chat-1"), "resource_manage", json!({}), UserId::new("alice"), None)
            .await;
        // The sleeping timer task holds the only other handle on the tables.
        assert_eq!(Arc::strong_count(&service.tables), 2);

        service.grant(ticket.request.id, None).await.unwrap();
        for _ in 0..100 {
            if Arc::strong_count(&service.tables) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&service.tables), 1);
    }

    #[tokio::test]
    async fn test_resolved_history_is_bounded() {
        let service = Arc::new(
            ApprovalService::new(EventBus::new(16), Duration::from_secs(5))
                .with_resolved_capacity(2),
        );
        let mut ids = Vec::new();
        for _ in 0..3 {
            let ticket = service
                .open(context("chat-1"), "send_message", json!({}), UserId::new("alice"), None)
                .await;
            service.grant(ticket.request.id, None).await.unwrap();
            ids.push(ticket.request.id);
        }

        assert!(service.get(ids[0]).await.is_none());
        assert_eq!(service.grant(ids[0], None).await, Err(ApprovalError::NotFound(ids[0])));
        assert!(matches!(
            service.get(ids[2]).await,
            Some((_, ApprovalStatus::Granted { .. }))
        ));
        assert!(matches!(
            service.grant(ids[1], None).await,
            Err(ApprovalError::AlreadyResolved { .. })
        ));
        let tables = service.tables.read().await;
        assert_eq!(tables.resolved.len(), 2);
        assert_eq!(tables.resolved_order.len(), 2);
    }
}

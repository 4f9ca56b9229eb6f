// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the tool gateway
//!
//! Drives every built-in tool through `ToolGateway::call` against an
//! in-memory orchestrator and checks the `{ isError, content }` envelope.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use loom_core::domain::conversation::{ConversationConfig, ConversationId};
use loom_core::domain::events::ConversationEvent;
use loom_core::domain::identity::{CallerIdentity, UserId};
use loom_core::domain::node_config::NodeConfigManifest;
use loom_core::domain::repository::{PersistenceService, ResourceKind};
use loom_core::domain::run::{RunMode, RunState};
use loom_core::infrastructure::event_bus::DomainEvent;
use loom_core::infrastructure::persistence::InMemoryPersistence;
use loom_core::infrastructure::queue::InMemoryTaskQueue;
use loom_swarm::application::service::SwarmService;
use loom_swarm::tools::{CallContext, ToolCallRequest, ToolResponse};
use loom_swarm::{Orchestrator, SpawnRequest, SwarmId, SwarmState};

struct Harness {
    orchestrator: Arc<Orchestrator>,
    queue: InMemoryTaskQueue,
    persistence: InMemoryPersistence,
}

fn harness_with(config: NodeConfigManifest) -> Harness {
    let queue = InMemoryTaskQueue::new();
    let persistence = InMemoryPersistence::new();
    let orchestrator = Orchestrator::with_collaborators(
        &config,
        Arc::new(persistence.clone()),
        Arc::new(queue.clone()),
    );
    Harness {
        orchestrator: Arc::new(orchestrator),
        queue,
        persistence,
    }
}

fn harness() -> Harness {
    harness_with(NodeConfigManifest::default())
}

fn alice() -> CallContext {
    CallContext::for_caller(CallerIdentity::user("alice"))
}

async fn call(h: &Harness, ctx: &CallContext, tool: &str, arguments: Value) -> ToolResponse {
    h.orchestrator
        .gateway
        .call(ctx, ToolCallRequest::new(tool, arguments))
        .await
}

async fn start_root(h: &Harness, user: &str, conversation: &str) -> SwarmId {
    h.orchestrator
        .start_swarm(
            &CallerIdentity::user(user),
            ConversationId::new(conversation),
            SpawnRequest {
                goal: "coordinate the launch".to_string(),
                ..SpawnRequest::default()
            },
        )
        .await
        .unwrap()
        .swarm_id
}

fn body(response: &ToolResponse) -> Value {
    response
        .json_content()
        .unwrap_or_else(|| panic!("Expected JSON body, got: {}", response.text_content()))
}

/// Test 1: Standalone run starts when no swarm is active
#[tokio::test]
async fn test_run_routine_standalone() {
    let h = harness();
    let response = call(
        &h,
        &alice(),
        "run_routine",
        json!({ "routineVersionId": "rv-1", "mode": "standalone" }),
    )
    .await;

    assert!(!response.is_error, "{}", response.text_content());
    assert!(response.text_content().contains("Run started successfully"));
    assert!(response.text_content().contains("Mode: standalone"));

    let records = h.orchestrator.runs.get_ordered_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RunState::Running);
    assert_eq!(h.queue.submitted().len(), 1);
}

/// Test 2: Queue rejection is reported and the run is not left registered
#[tokio::test]
async fn test_run_routine_queue_failure() {
    let h = harness();
    h.queue.fail_with("broker unavailable");

    let response = call(
        &h,
        &alice(),
        "run_routine",
        json!({ "routineVersionId": "rv-1", "mode": "standalone" }),
    )
    .await;

    assert!(response.is_error);
    let text = response.text_content();
    assert!(text.contains("Failed to queue run task"), "{text}");
    assert!(text.contains("broker unavailable"), "{text}");
    assert!(h.orchestrator.runs.is_empty());
}

/// Test 3: Without an explicit mode the caller's active swarm is picked up
#[tokio::test]
async fn test_run_routine_joins_active_swarm() {
    let h = harness();
    let swarm_id = start_root(&h, "alice", "chat-1").await;

    let response = call(&h, &alice(), "run_routine", json!({ "routineVersionId": "rv-1" })).await;
    assert!(!response.is_error, "{}", response.text_content());
    assert!(response.text_content().contains("swarm-integrated"));

    let record = h.orchestrator.runs.get_ordered_records().remove(0);
    let run = h.orchestrator.runs.get(&record.id).await.unwrap();
    assert_eq!(run.mode, RunMode::SwarmIntegrated);
    assert_eq!(run.swarm_id(), Some(swarm_id));
    assert_eq!(run.parent_swarm_id(), None);

    // Another user's swarm is never picked up
    let bob = CallContext::for_caller(CallerIdentity::user("bob"));
    let response = call(&h, &bob, "run_routine", json!({ "routineVersionId": "rv-2" })).await;
    assert!(response.text_content().contains("Mode: standalone"));
}

/// Test 4: Explicit swarm-integrated mode without a swarm is refused
#[tokio::test]
async fn test_run_routine_swarm_mode_without_swarm() {
    let h = harness();
    let response = call(
        &h,
        &alice(),
        "run_routine",
        json!({ "routineVersionId": "rv-1", "mode": "swarm-integrated" }),
    )
    .await;
    assert!(response.is_error);
    assert!(response.text_content().contains("active swarm context"));
    assert!(h.queue.submitted().is_empty());
}

/// Test 5: Managing an unknown run names the run and the registry
#[tokio::test]
async fn test_manage_unknown_run() {
    let h = harness();
    let run_id = uuid::Uuid::new_v4();
    for action in ["status", "pause", "cancel", "resume"] {
        let response = call(
            &h,
            &alice(),
            "manage_run",
            json!({ "runId": run_id.to_string(), "action": action }),
        )
        .await;
        assert!(response.is_error);
        let text = response.text_content();
        assert!(text.contains("not found in active runs registry"), "{text}");
        assert!(text.contains(&run_id.to_string()), "{text}");
    }
}

/// Test 6: Pause, status, resume and cancel through manage_run
#[tokio::test]
async fn test_manage_run_lifecycle() {
    let h = harness();
    call(&h, &alice(), "run_routine", json!({ "routineVersionId": "rv-1" })).await;
    let run_id = h.orchestrator.runs.get_ordered_records()[0].id.to_string();
    let manage = |action: &str| json!({ "runId": run_id, "action": action });

    let paused = call(&h, &alice(), "manage_run", manage("pause")).await;
    assert!(!paused.is_error, "{}", paused.text_content());

    let status = call(&h, &alice(), "manage_run", manage("status")).await;
    assert_eq!(body(&status)["state"], json!("paused"));

    let resumed = call(&h, &alice(), "manage_run", manage("resume")).await;
    assert!(resumed.is_error);
    assert!(resumed.text_content().contains("not implemented"));

    let cancelled = call(&h, &alice(), "manage_run", manage("cancel")).await;
    assert!(cancelled.text_content().contains("Cancelled by user"));

    let paused_again = call(&h, &alice(), "manage_run", manage("pause")).await;
    assert!(paused_again.is_error);
    assert!(paused_again.text_content().contains("cannot pause"));

    let cancelled_again = call(&h, &alice(), "manage_run", manage("cancel")).await;
    assert!(cancelled_again.is_error);
    assert!(cancelled_again.text_content().contains("already stopped"));
}

/// Test 7: Other users cannot manage a run they do not own
#[tokio::test]
async fn test_manage_run_requires_owner() {
    let h = harness();
    call(&h, &alice(), "run_routine", json!({ "routineVersionId": "rv-1" })).await;
    let run_id = h.orchestrator.runs.get_ordered_records()[0].id.to_string();

    let bob = CallContext::for_caller(CallerIdentity::user("bob"));
    let response = call(&h, &bob, "manage_run", json!({ "runId": run_id, "action": "pause" })).await;
    assert!(response.is_error);
    assert!(response.text_content().contains("not allowed"));

    let admin = CallContext::for_caller(CallerIdentity::admin("ops"));
    let response = call(&h, &admin, "manage_run", json!({ "runId": run_id, "action": "pause" })).await;
    assert!(!response.is_error, "{}", response.text_content());
}

/// Test 8: Spawning without a parent fails however rich the request is
#[tokio::test]
async fn test_spawn_without_parent() {
    let h = harness();
    for arguments in [
        json!({ "goal": "short" }),
        json!({
            "goal": "x".repeat(400),
            "teamId": "team-1",
            "modelHint": "gpt-4.1",
            "initialSubTasks": ["a", "b", "c"]
        }),
    ] {
        let response = call(&h, &alice(), "spawn_swarm", arguments).await;
        assert!(response.is_error);
        assert!(response
            .text_content()
            .contains("can only be called from within an active swarm context"));
    }

    let unknown_parent = json!({ "goal": "g", "parentSwarmId": uuid::Uuid::new_v4().to_string() });
    let response = call(&h, &alice(), "spawn_swarm", unknown_parent).await;
    assert!(response.text_content().contains("active swarm context"));
}

/// Test 9: A child swarm is carved out of the parent's remaining budget
#[tokio::test]
async fn test_spawn_child_within_parent_budget() {
    let h = harness();
    let parent_id = start_root(&h, "alice", "chat-1").await;
    let before = h.orchestrator.swarms.get_swarm(&parent_id).await.unwrap();

    let response = call(
        &h,
        &alice(),
        "spawn_swarm",
        json!({ "goal": "research competitors", "modelHint": "gpt-4.1" }),
    )
    .await;
    assert!(!response.is_error, "{}", response.text_content());
    assert!(response.text_content().contains("Swarm spawned successfully"));

    let parent = h.orchestrator.swarms.get_swarm(&parent_id).await.unwrap();
    let child_id = parent.children()[0];
    let child = h.orchestrator.swarms.get_swarm(&child_id).await.unwrap();
    assert_eq!(child.parent_swarm_id, Some(parent_id));
    assert_eq!(child.state(), SwarmState::Running);
    assert!(child.allocation().max_credits <= before.remaining_credits());
    assert_eq!(
        parent.remaining_credits(),
        before.remaining_credits() - child.allocation().max_credits
    );
    assert_eq!(child.allocation().model, "gpt-4.1");
}

/// Test 10: Shared state update on an unknown conversation
#[tokio::test]
async fn test_update_shared_state_missing_conversation() {
    let h = harness();
    let response = call(
        &h,
        &alice(),
        "update_swarm_shared_state",
        json!({ "conversationId": "chat-404", "sharedScratchpad": { "set": { "k": 1 } } }),
    )
    .await;
    assert!(response.is_error);
    let body = body(&response);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("CONVERSATION_STATE_NOT_FOUND"));
}

/// Test 11: A facet update returns only that facet
#[tokio::test]
async fn test_update_shared_state_single_facet() {
    let h = harness();
    h.orchestrator
        .conversations
        .insert(ConversationId::new("chat-1"), ConversationConfig::default())
        .await
        .unwrap();
    let ctx = alice().with_conversation(ConversationId::new("chat-1"));

    let response = call(
        &h,
        &ctx,
        "update_swarm_shared_state",
        json!({
            "subTasks": { "upsert": [{ "id": "t1", "status": "todo", "description": "draft" }] },
            "expectedVersion": 0
        }),
    )
    .await;
    assert!(!response.is_error, "{}", response.text_content());
    let updated = body(&response);
    assert_eq!(updated["success"], json!(true));
    assert_eq!(updated["updatedSubTasks"][0]["id"], json!("t1"));
    assert!(updated.get("updatedSharedScratchpad").is_none());
    assert!(updated.get("updatedTeamConfig").is_none());

    let both = call(
        &h,
        &ctx,
        "update_swarm_shared_state",
        json!({ "subTasks": {}, "sharedScratchpad": {} }),
    )
    .await;
    assert_eq!(body(&both)["error"], json!("INVALID_SHARED_STATE_UPDATE"));
}

/// Test 12: The owner ends a swarm gracefully
#[tokio::test]
async fn test_end_swarm_by_owner() {
    let h = harness();
    let swarm_id = start_root(&h, "alice", "chat-1").await;

    let response = call(
        &h,
        &alice(),
        "end_swarm",
        json!({ "swarmId": swarm_id.to_string(), "reason": "graceful" }),
    )
    .await;
    assert!(!response.is_error, "{}", response.text_content());
    let body = body(&response);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["finalState"]["mode"], json!("graceful"));
    assert_eq!(body["finalState"]["reason"], json!("graceful"));

    let swarm = h.orchestrator.swarms.get_swarm(&swarm_id).await.unwrap();
    assert_eq!(swarm.state(), SwarmState::Stopped);
}

/// Test 13: Non-owners are refused, admins are not
#[tokio::test]
async fn test_end_swarm_authorization() {
    let mut config = NodeConfigManifest::default();
    config.spec.platform.admin_user_id = Some("root".to_string());
    let h = harness_with(config);
    let first = start_root(&h, "alice", "chat-1").await;
    let second = start_root(&h, "alice", "chat-2").await;

    let mallory = CallContext::for_caller(CallerIdentity::user("mallory"));
    let response = call(&h, &mallory, "end_swarm", json!({ "swarmId": first.to_string() })).await;
    assert_eq!(body(&response)["error"], json!("INSUFFICIENT_PERMISSIONS"));

    let flagged_admin = CallContext::for_caller(CallerIdentity::admin("ops"));
    let response = call(&h, &flagged_admin, "end_swarm", json!({ "swarmId": first.to_string() })).await;
    assert_eq!(body(&response)["success"], json!(true));

    let platform_admin = CallContext::for_caller(CallerIdentity::user("root"));
    let response = call(&h, &platform_admin, "end_swarm", json!({ "swarmId": second.to_string() })).await;
    assert_eq!(body(&response)["success"], json!(true));
}

/// Test 14: Missing identity and missing swarm are reported with their codes
#[tokio::test]
async fn test_end_swarm_error_codes() {
    let h = harness();
    let swarm_id = start_root(&h, "alice", "chat-1").await;

    let response = call(
        &h,
        &CallContext::anonymous(),
        "end_swarm",
        json!({ "swarmId": swarm_id.to_string() }),
    )
    .await;
    assert_eq!(body(&response)["error"], json!("AUTHENTICATION_REQUIRED"));

    let response = call(
        &h,
        &alice(),
        "end_swarm",
        json!({ "swarmId": uuid::Uuid::new_v4().to_string() }),
    )
    .await;
    assert_eq!(body(&response)["error"], json!("NO_ACTIVE_SWARM_INSTANCE"));
}

/// Test 15: Ending twice returns the same final state; force degrades
#[tokio::test]
async fn test_end_swarm_idempotent_and_force_degrades() {
    let h = harness();
    let swarm_id = start_root(&h, "alice", "chat-1").await;
    let args = json!({ "swarmId": swarm_id.to_string(), "mode": "force", "reason": "abort" });

    let first = body(&call(&h, &alice(), "end_swarm", args.clone()).await);
    let second = body(&call(&h, &alice(), "end_swarm", args).await);

    assert_eq!(first["finalState"], second["finalState"]);
    assert_eq!(first["finalState"]["mode"], json!("graceful"));
    assert_eq!(first["finalState"]["requestedMode"], json!("force"));
    assert!(first["finalState"]["note"].as_str().unwrap().contains("gracefully"));
}

/// Test 16: Ending a parent stops its children and settles their usage
#[tokio::test]
async fn test_end_swarm_cascades_to_children() {
    let h = harness();
    let parent_id = start_root(&h, "alice", "chat-1").await;
    call(&h, &alice(), "spawn_swarm", json!({ "goal": "child work" })).await;
    let child_id = h.orchestrator.swarms.get_swarm(&parent_id).await.unwrap().children()[0];

    let child_ctx = alice().with_swarm(child_id);
    h.orchestrator.swarms.record_tool_call(&child_id, 7).await.unwrap();
    call(&h, &child_ctx, "run_routine", json!({ "routineVersionId": "rv-1" })).await;

    call(&h, &alice(), "end_swarm", json!({ "swarmId": parent_id.to_string() })).await;

    let child = h.orchestrator.swarms.get_swarm(&child_id).await.unwrap();
    assert_eq!(child.state(), SwarmState::Stopped);
    assert!(child.final_state().unwrap().reason.contains(&parent_id.to_string()));

    let parent = h.orchestrator.swarms.get_swarm(&parent_id).await.unwrap();
    assert_eq!(parent.reserved_credits(), 0);
}

/// Test 17: Unknown tools and malformed arguments come back as error envelopes
#[tokio::test]
async fn test_unknown_tool_and_bad_arguments() {
    let h = harness();
    let response = call(&h, &alice(), "format_disk", json!({})).await;
    assert!(response.is_error);
    assert_eq!(response.text_content(), "Unknown tool: format_disk");

    let response = call(&h, &alice(), "manage_run", json!({ "runId": "r-1", "action": "explode" })).await;
    assert!(response.is_error);
    assert!(response.text_content().starts_with("Invalid arguments for manage_run"));

    let response = call(&h, &alice(), "manage_run", json!({ "runId": "not-a-uuid", "action": "status" })).await;
    assert!(response.text_content().contains("runId"));
}

/// Test 18: define_tool validates the schema and extends the catalogue
#[tokio::test]
async fn test_define_tool() {
    let h = harness();
    let bad = call(
        &h,
        &alice(),
        "define_tool",
        json!({ "name": "weather", "description": "d", "inputSchema": { "type": 12 } }),
    )
    .await;
    assert!(bad.is_error);
    assert!(bad.text_content().contains("inputSchema"));

    let builtin = call(
        &h,
        &alice(),
        "define_tool",
        json!({ "name": "end_swarm", "description": "d", "inputSchema": { "type": "object" } }),
    )
    .await;
    assert!(builtin.text_content().contains("built-in"));

    let args = json!({
        "name": "weather",
        "description": "Current weather for a city",
        "inputSchema": { "type": "object", "properties": { "city": { "type": "string" } } }
    });
    let ok = call(&h, &alice(), "define_tool", args.clone()).await;
    assert!(!ok.is_error, "{}", ok.text_content());
    let again = call(&h, &alice(), "define_tool", args).await;
    assert!(again.text_content().contains("already defined"));

    let tools = h.orchestrator.gateway.list_tools().await;
    let weather = tools.iter().find(|t| t.name == "weather").unwrap();
    assert!(!weather.builtin);
    assert_eq!(tools.iter().filter(|t| t.builtin).count(), 8);
}

/// Test 19: send_message persists the message and announces it
#[tokio::test]
async fn test_send_message() {
    let h = harness();
    let missing = call(&h, &alice(), "send_message", json!({ "conversationId": "chat-9", "content": "hi" })).await;
    assert!(missing.is_error);
    assert!(missing.text_content().contains("chat-9"));

    h.persistence
        .create(ResourceKind::Chat, "chat-1", json!({ "title": "launch" }))
        .await
        .unwrap();
    let mut events = h
        .orchestrator
        .event_bus
        .subscribe_conversation(ConversationId::new("chat-1"));

    let ctx = alice().with_conversation(ConversationId::new("chat-1"));
    let empty = call(&h, &ctx, "send_message", json!({ "content": "   " })).await;
    assert!(empty.text_content().contains("content"));

    let posted = call(&h, &ctx, "send_message", json!({ "content": "status update" })).await;
    assert!(!posted.is_error, "{}", posted.text_content());

    match events.recv().await.unwrap() {
        DomainEvent::Conversation(ConversationEvent::MessagePosted { author, .. }) => {
            assert_eq!(author.as_str(), "alice");
        }
        other => panic!("Unexpected event: {other:?}"),
    }
    let messages = h
        .persistence
        .find(ResourceKind::ChatMessage, &serde_json::Map::new())
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data["content"], json!("status update"));
}

/// Test 20: resource_manage scopes every operation to the owner
#[tokio::test]
async fn test_resource_manage_ownership() {
    let h = harness();
    let added = call(
        &h,
        &alice(),
        "resource_manage",
        json!({ "operation": "add", "resourceType": "note", "id": "n1", "attributes": { "text": "hello" } }),
    )
    .await;
    assert!(!added.is_error, "{}", added.text_content());

    let bob = CallContext::for_caller(CallerIdentity::user("bob"));
    let found = body(&call(&h, &bob, "resource_manage", json!({ "operation": "find", "resourceType": "note" })).await);
    assert_eq!(found["count"], json!(0));

    let stolen = call(
        &h,
        &bob,
        "resource_manage",
        json!({ "operation": "update", "resourceType": "note", "id": "n1", "attributes": { "text": "mine" } }),
    )
    .await;
    assert!(stolen.is_error);

    let chown = call(
        &h,
        &alice(),
        "resource_manage",
        json!({ "operation": "update", "resourceType": "note", "id": "n1", "attributes": { "ownerId": "bob" } }),
    )
    .await;
    assert!(chown.text_content().contains("ownerId"));

    let forbidden = call(&h, &alice(), "resource_manage", json!({ "operation": "find", "resourceType": "team" })).await;
    assert!(forbidden.is_error);

    let deleted = call(&h, &alice(), "resource_manage", json!({ "operation": "delete", "resourceType": "note", "id": "n1" })).await;
    assert!(!deleted.is_error, "{}", deleted.text_content());
    assert!(h.persistence.is_empty());
}

/// Test 21: Persistence failures are passed through verbatim
#[tokio::test]
async fn test_persistence_failure_passthrough() {
    let h = harness();
    h.persistence.fail_with("disk full");
    let response = call(
        &h,
        &alice(),
        "resource_manage",
        json!({ "operation": "add", "resourceType": "note", "attributes": {} }),
    )
    .await;
    assert!(response.is_error);
    assert!(response.text_content().contains("disk full"));
}

fn gated_config(timeout: Duration) -> NodeConfigManifest {
    let mut config = NodeConfigManifest::default();
    config.spec.approvals.require_approval_for = vec!["resource_manage".to_string()];
    config.spec.approvals.default_timeout = timeout;
    config
}

async fn wait_for_pending(h: &Harness) -> loom_core::domain::approval::ToolApprovalRequest {
    loop {
        if let Some(request) = h.orchestrator.approvals.list_pending().await.into_iter().next() {
            return request;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Test 22: A gated tool runs once approved and fails once rejected
#[tokio::test]
async fn test_approval_grant_and_reject() {
    let h = Arc::new(harness_with(gated_config(Duration::from_secs(30))));
    let ctx = alice().with_conversation(ConversationId::new("chat-1"));
    let args = json!({ "operation": "add", "resourceType": "note", "attributes": {} });

    let pending_call = {
        let h = h.clone();
        let ctx = ctx.clone();
        let args = args.clone();
        tokio::spawn(async move { call(&h, &ctx, "resource_manage", args).await })
    };
    let request = wait_for_pending(&h).await;
    assert_eq!(request.tool_name, "resource_manage");
    h.orchestrator
        .approvals
        .grant(request.id, Some(UserId::new("reviewer")))
        .await
        .unwrap();
    let response = pending_call.await.unwrap();
    assert!(!response.is_error, "{}", response.text_content());

    let pending_call = {
        let h = h.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { call(&h, &ctx, "resource_manage", args).await })
    };
    let request = wait_for_pending(&h).await;
    h.orchestrator
        .approvals
        .reject(request.id, None, "not today")
        .await
        .unwrap();
    let response = pending_call.await.unwrap();
    assert!(response.is_error);
    assert!(response.text_content().contains("not today"));

    // Calls outside a conversation have nobody to ask
    let direct = call(
        &h,
        &alice(),
        "resource_manage",
        json!({ "operation": "find", "resourceType": "note" }),
    )
    .await;
    assert!(!direct.is_error, "{}", direct.text_content());
}

/// Test 23: An unanswered approval times out instead of blocking
#[tokio::test(start_paused = true)]
async fn test_approval_timeout() {
    let h = harness_with(gated_config(Duration::from_secs(2)));
    let ctx = alice().with_conversation(ConversationId::new("chat-1"));
    let response = call(
        &h,
        &ctx,
        "resource_manage",
        json!({ "operation": "find", "resourceType": "note" }),
    )
    .await;
    assert!(response.is_error);
    assert!(response.text_content().contains("was not granted within 2000 ms"));
    assert!(h.orchestrator.approvals.list_pending().await.is_empty());
}

/// Test 24: Sub-task updates are reflected in the conversation's live swarms
#[tokio::test]
async fn test_sub_task_progress_reaches_swarms() {
    let h = harness();
    let root_id = start_root(&h, "alice", "chat-1").await;
    call(&h, &alice(), "spawn_swarm", json!({ "goal": "child work" })).await;
    let child_id = h.orchestrator.swarms.get_swarm(&root_id).await.unwrap().children()[0];
    let other_id = start_root(&h, "alice", "chat-2").await;

    let ctx = alice().with_conversation(ConversationId::new("chat-1"));
    let response = call(
        &h,
        &ctx,
        "update_swarm_shared_state",
        json!({
            "subTasks": { "upsert": [
                { "id": "t1", "status": "done", "description": "draft" },
                { "id": "t2", "status": "todo", "description": "review" }
            ] }
        }),
    )
    .await;
    assert!(!response.is_error, "{}", response.text_content());

    for id in [root_id, child_id] {
        let summary = h.orchestrator.swarms.get_swarm(&id).await.unwrap().summary();
        assert_eq!(summary.sub_tasks_total, 2);
        assert_eq!(summary.sub_tasks_completed, 1);
    }
    let other = h.orchestrator.swarms.get_swarm(&other_id).await.unwrap().summary();
    assert_eq!(other.sub_tasks_total, 0);

    let ended = call(&h, &alice(), "end_swarm", json!({ "swarmId": root_id.to_string() })).await;
    let totals = &body(&ended)["finalState"]["totals"];
    assert_eq!(totals["subTasksTotal"], json!(2));
    assert_eq!(totals["subTasksCompleted"], json!(1));
}

/// Test 25: The configured platform admin can run routines inside any swarm
#[tokio::test]
async fn test_platform_admin_joins_swarm_run() {
    let mut config = NodeConfigManifest::default();
    config.spec.platform.admin_user_id = Some("root".to_string());
    let h = harness_with(config);
    let swarm_id = start_root(&h, "alice", "chat-1").await;

    let operator = CallContext::for_caller(CallerIdentity::user("root")).with_swarm(swarm_id);
    let response = call(
        &h,
        &operator,
        "run_routine",
        json!({ "routineVersionId": "rv-1", "mode": "swarm-integrated" }),
    )
    .await;
    assert!(!response.is_error, "{}", response.text_content());

    let record = h.orchestrator.runs.get_ordered_records().remove(0);
    let run = h.orchestrator.runs.get(&record.id).await.unwrap();
    assert_eq!(run.swarm_id(), Some(swarm_id));

    let stranger = CallContext::for_caller(CallerIdentity::user("mallory")).with_swarm(swarm_id);
    let response = call(
        &h,
        &stranger,
        "run_routine",
        json!({ "routineVersionId": "rv-1", "mode": "swarm-integrated" }),
    )
    .await;
    assert!(response.is_error);
}

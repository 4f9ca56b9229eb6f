// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the conversation shared-state store
//!
//! Covers lazy hydration from persistence, per-facet versioning, team
//! authorization and the guarantee that a failed update leaves every facet
//! untouched.

use loom_core::application::conversation_store::ConversationStore;
use loom_core::domain::conversation::{
    ConversationConfig, ConversationId, ConversationStateError, Facet, Scratchpad,
    SharedStateUpdate, SubTask, SubTaskStatus, TeamConfig,
};
use loom_core::domain::identity::CallerIdentity;
use loom_core::domain::repository::{PersistenceService, ResourceKind};
use loom_core::infrastructure::event_bus::{DomainEvent, EventBus};
use loom_core::infrastructure::persistence::InMemoryPersistence;
use loom_core::domain::events::ConversationEvent;
use serde_json::json;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn setup() -> (ConversationStore, InMemoryPersistence, EventBus) {
    let persistence = InMemoryPersistence::new();
    let event_bus = EventBus::new(64);
    let store = ConversationStore::new(Arc::new(persistence.clone()), event_bus.clone());
    (store, persistence, event_bus)
}

fn sub_task(id: &str) -> SubTask {
    SubTask {
        id: id.to_string(),
        status: SubTaskStatus::Todo,
        description: format!("do {id}"),
        assignee: None,
        depends_on: vec![],
    }
}

fn scratch(key: &str, value: serde_json::Value) -> Scratchpad {
    let mut map = Scratchpad::new();
    map.insert(key.to_string(), value);
    map
}

async fn seed_team(persistence: &InMemoryPersistence, team: &str, owner: &str, members: &[&str]) {
    persistence
        .create(
            ResourceKind::Team,
            team,
            json!({ "ownerId": owner, "members": members }),
        )
        .await
        .unwrap();
}

/// Test 1: Unknown conversation yields NotFound and `get` returns None
#[tokio::test]
async fn test_missing_conversation() {
    let (store, _, _) = setup();
    let id = ConversationId::new("chat-missing");

    assert!(store.get(&id).await.is_none());
    let err = store
        .update_swarm_shared_state(
            &id,
            SharedStateUpdate::Scratchpad {
                set: scratch("k", json!(1)),
                remove: vec![],
            },
            None,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONVERSATION_STATE_NOT_FOUND");
}

/// Test 2: Stored chat without a config is reported as malformed
#[tokio::test]
async fn test_config_not_found() {
    let (store, persistence, _) = setup();
    persistence
        .create(ResourceKind::Chat, "chat-1", json!({ "title": "no config" }))
        .await
        .unwrap();
    let id = ConversationId::new("chat-1");

    let state = store.get(&id).await.unwrap();
    assert!(state.config.is_none());

    let err = store
        .update_swarm_shared_state(
            &id,
            SharedStateUpdate::SubTasks {
                upsert: vec![sub_task("a")],
                remove: vec![],
            },
            None,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err, ConversationStateError::ConfigNotFound(id));
}

/// Test 3: Updating one facet returns only that facet and bumps only its version
#[tokio::test]
async fn test_single_facet_update() {
    let (store, persistence, _) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    let result = store
        .update_swarm_shared_state(
            &id,
            SharedStateUpdate::SubTasks {
                upsert: vec![sub_task("a"), sub_task("b")],
                remove: vec![],
            },
            Some(0),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.facet, Facet::SubTasks);
    assert_eq!(result.version, 1);
    assert_eq!(result.updated_sub_tasks.as_ref().map(Vec::len), Some(2));
    assert!(result.updated_shared_scratchpad.is_none());
    assert!(result.updated_team_config.is_none());

    let state = store.get(&id).await.unwrap();
    let config = state.config.unwrap();
    assert_eq!(config.versions.sub_tasks, 1);
    assert_eq!(config.versions.shared_scratchpad, 0);

    // Written through to the chat record
    let record = persistence.read(ResourceKind::Chat, "chat-1").await.unwrap().unwrap();
    assert_eq!(record.data["config"]["subTasks"][1]["id"], json!("b"));
    assert_eq!(record.data["config"]["versions"]["subTasks"], json!(1));
}

/// Test 4: A stale expected version is rejected without changes
#[tokio::test]
async fn test_stale_update_rejected() {
    let (store, _, _) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    let update = || SharedStateUpdate::Scratchpad {
        set: scratch("plan", json!("v1")),
        remove: vec![],
    };
    store.update_swarm_shared_state(&id, update(), Some(0), None).await.unwrap();
    let err = store
        .update_swarm_shared_state(&id, update(), Some(0), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ConversationStateError::Stale {
            facet: Facet::SharedScratchpad,
            expected: 0,
            actual: 1
        }
    );
    assert_eq!(err.code(), "STALE_SHARED_STATE");
}

/// Test 5: Team config requires a session user
#[tokio::test]
async fn test_team_config_requires_session_user() {
    let (store, _, _) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    let err = assert_err!(
        store
            .update_team_config(&id, TeamConfig::default(), None, None)
            .await
    );
    assert_eq!(err.code(), "SESSION_USER_REQUIRED");
}

/// Test 6: Only team owner or members may change the team config
#[tokio::test]
async fn test_team_config_authorization() {
    let (store, persistence, _) = setup();
    seed_team(&persistence, "team-1", "alice", &["bob"]).await;
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    let config = TeamConfig {
        team_id: Some("team-1".to_string()),
        goal: Some("ship it".to_string()),
        ..TeamConfig::default()
    };

    let outsider = CallerIdentity::user("mallory");
    let err = store
        .update_team_config(&id, config.clone(), None, Some(&outsider))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TEAM_NOT_FOUND_OR_ACCESS_DENIED");

    let member = CallerIdentity::user("bob");
    let result = assert_ok!(
        store
            .update_team_config(&id, config.clone(), None, Some(&member))
            .await
    );
    assert_eq!(result.updated_team_config, Some(config));
    assert!(result.updated_sub_tasks.is_none());

    let ghost_team = TeamConfig {
        team_id: Some("team-404".to_string()),
        ..TeamConfig::default()
    };
    let owner = CallerIdentity::user("alice");
    let err = store
        .update_team_config(&id, ghost_team, None, Some(&owner))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TEAM_NOT_FOUND_OR_ACCESS_DENIED");
}

/// Test 7: A persistence failure leaves memory untouched
#[tokio::test]
async fn test_persistence_failure_does_not_commit() {
    let (store, persistence, _) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    persistence.fail_with("connection reset");
    let err = store
        .update_swarm_shared_state(
            &id,
            SharedStateUpdate::SubTasks {
                upsert: vec![sub_task("a")],
                remove: vec![],
            },
            None,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILURE");
    assert!(err.to_string().contains("connection reset"));

    persistence.recover();
    let config = store.get(&id).await.unwrap().config.unwrap();
    assert!(config.sub_tasks.is_empty());
    assert_eq!(config.versions.sub_tasks, 0);
}

/// Test 8: State survives eviction through hydration
#[tokio::test]
async fn test_hydration_after_evict() {
    let (store, _, _) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();
    store
        .update_swarm_shared_state(
            &id,
            SharedStateUpdate::Scratchpad {
                set: scratch("nested", json!({"a": 1})),
                remove: vec![],
            },
            None,
            None,
        )
        .await
        .unwrap();

    assert!(store.evict(&id));
    let config = store.get(&id).await.unwrap().config.unwrap();
    assert_eq!(config.shared_scratchpad["nested"], json!({"a": 1}));
    assert_eq!(config.versions.shared_scratchpad, 1);
}

/// Test 9: Concurrent updates to one facet are all applied in sequence
#[tokio::test]
async fn test_concurrent_facet_updates() {
    let (store, _, _) = setup();
    let store = Arc::new(store);
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store
                .update_swarm_shared_state(
                    &id,
                    SharedStateUpdate::Scratchpad {
                        set: scratch(&format!("k{i}"), json!(i)),
                        remove: vec![],
                    },
                    None,
                    None,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let config = store.get(&id).await.unwrap().config.unwrap();
    assert_eq!(config.shared_scratchpad.len(), 20);
    assert_eq!(config.versions.shared_scratchpad, 20);
    assert_eq!(config.versions.sub_tasks, 0);
}

/// Test 10: Successful updates are announced on the conversation's channel
#[tokio::test]
async fn test_update_publishes_event() {
    let (store, _, event_bus) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();
    let mut receiver = event_bus.subscribe_conversation(id.clone());

    store
        .update_swarm_shared_state(
            &id,
            SharedStateUpdate::SubTasks {
                upsert: vec![sub_task("a")],
                remove: vec![],
            },
            None,
            None,
        )
        .await
        .unwrap();

    match receiver.recv().await.unwrap() {
        DomainEvent::Conversation(ConversationEvent::SharedStateUpdated { facet, version, .. }) => {
            assert_eq!(facet, Facet::SubTasks);
            assert_eq!(version, 1);
        }
        other => panic!("Unexpected event: {other:?}"),
    }
}

/// Test 11: Nested nulls in scratchpad values survive hydration
#[tokio::test]
async fn test_nested_null_survives_evict() {
    let (store, persistence, _) = setup();
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();
    persistence
        .update(ResourceKind::Chat, "chat-1", json!({ "title": "offsite" }))
        .await
        .unwrap();

    for plan in [json!({"owner": "alice", "step": 0}), json!({"owner": null, "step": 1})] {
        store
            .update_swarm_shared_state(
                &id,
                SharedStateUpdate::Scratchpad {
                    set: scratch("plan", plan),
                    remove: vec![],
                },
                None,
                None,
            )
            .await
            .unwrap();
    }
    let before = store.get(&id).await.unwrap().config.unwrap();

    assert!(store.evict(&id));
    let after = store.get(&id).await.unwrap().config.unwrap();
    assert_eq!(after.shared_scratchpad["plan"], json!({"owner": null, "step": 1}));
    assert_eq!(after.shared_scratchpad, before.shared_scratchpad);
    assert_eq!(after.versions.shared_scratchpad, 2);

    // Fields outside the config are left alone.
    let record = persistence.read(ResourceKind::Chat, "chat-1").await.unwrap().unwrap();
    assert_eq!(record.data["title"], json!("offsite"));
}

/// Test 12: Re-inserting a cached conversation keeps memory and storage in step
#[tokio::test]
async fn test_insert_over_cached_slot_with_updates_in_flight() {
    let (store, _, _) = setup();
    let store = Arc::new(store);
    let id = ConversationId::new("chat-1");
    store.insert(id.clone(), ConversationConfig::default()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store
                .update_swarm_shared_state(
                    &id,
                    SharedStateUpdate::Scratchpad {
                        set: scratch(&format!("k{i}"), json!(i)),
                        remove: vec![],
                    },
                    None,
                    None,
                )
                .await
                .map(|_| ())
        }));
    }
    let replacement = ConversationConfig {
        shared_scratchpad: scratch("reset", json!(true)),
        ..Default::default()
    };
    let inserted = tokio::spawn({
        let store = store.clone();
        let id = id.clone();
        async move { store.insert(id, replacement).await.map(|_| ()) }
    });

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_ok!(inserted.await.unwrap());

    let in_memory = store.get(&id).await.unwrap().config.unwrap();
    assert!(in_memory.shared_scratchpad.contains_key("reset"));
    store.evict(&id);
    let stored = store.get(&id).await.unwrap().config.unwrap();
    assert_eq!(stored.shared_scratchpad, in_memory.shared_scratchpad);
    assert_eq!(stored.versions, in_memory.versions);

    // The replaced slot still accepts versioned updates at its current version.
    assert_ok!(
        store
            .update_swarm_shared_state(
                &id,
                SharedStateUpdate::Scratchpad {
                    set: scratch("after", json!(1)),
                    remove: vec![],
                },
                Some(stored.versions.shared_scratchpad),
                None,
            )
            .await
    );
}

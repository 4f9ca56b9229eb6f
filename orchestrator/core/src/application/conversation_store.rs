// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Conversation Shared-State Store
//!
//! Keeps one slot per conversation with each facet (`subTasks`,
//! `sharedScratchpad`, `teamConfig`) behind its own lock, so updates to one
//! facet are applied in arrival order while the other facets stay untouched
//! and available. Slots are hydrated lazily from the `chat` record of the
//! persistence collaborator.
//!
//! An update is written through to persistence before it is committed in
//! memory; a persistence failure leaves the in-memory facet and its version
//! unchanged. The changed facet is stored whole, so values containing `null`
//! come back from hydration exactly as they were written. Writes to one
//! conversation's record are serialized by the slot's persistence lock, which
//! is always taken after any facet lock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::conversation::{
    apply_scratchpad, apply_sub_tasks, ConversationConfig, ConversationId, ConversationState,
    ConversationStateError, Facet, FacetVersions, Scratchpad, SharedStateUpdate,
    SharedStateUpdateResult, SubTask, TeamConfig,
};
use crate::domain::events::ConversationEvent;
use crate::domain::identity::{CallerIdentity, UserId};
use crate::domain::repository::{PersistenceError, PersistenceService, ResourceKind};
use crate::infrastructure::event_bus::EventBus;

struct Versioned<T> {
    value: T,
    version: u64,
}

struct Facets {
    sub_tasks: Mutex<Versioned<Vec<SubTask>>>,
    scratchpad: Mutex<Versioned<Scratchpad>>,
    team_config: Mutex<Versioned<Option<TeamConfig>>>,
}

impl Facets {
    fn from_config(config: ConversationConfig) -> Self {
        Self {
            sub_tasks: Mutex::new(Versioned {
                value: config.sub_tasks,
                version: config.versions.sub_tasks,
            }),
            scratchpad: Mutex::new(Versioned {
                value: config.shared_scratchpad,
                version: config.versions.shared_scratchpad,
            }),
            team_config: Mutex::new(Versioned {
                value: config.team_config,
                version: config.versions.team_config,
            }),
        }
    }
}

struct ConversationSlot {
    /// `None` for a conversation whose stored record has no usable config.
    facets: Option<Facets>,
    updated_at: parking_lot::Mutex<DateTime<Utc>>,
    persist: Mutex<()>,
}

impl ConversationSlot {
    fn new(config: Option<ConversationConfig>) -> Self {
        Self {
            facets: config.map(Facets::from_config),
            updated_at: parking_lot::Mutex::new(Utc::now()),
            persist: Mutex::new(()),
        }
    }

    fn touch(&self) {
        *self.updated_at.lock() = Utc::now();
    }
}

pub struct ConversationStore {
    slots: DashMap<ConversationId, Arc<ConversationSlot>>,
    persistence: Arc<dyn PersistenceService>,
    event_bus: EventBus,
}

fn persistence_error(err: PersistenceError) -> ConversationStateError {
    ConversationStateError::Persistence(err.to_string())
}

impl ConversationStore {
    pub fn new(persistence: Arc<dyn PersistenceService>, event_bus: EventBus) -> Self {
        Self {
            slots: DashMap::new(),
            persistence,
            event_bus,
        }
    }

    /// Create (or overwrite) the shared state of a conversation.
    ///
    /// A cached slot with facets is overwritten in place while holding every
    /// facet lock, so in-flight updates either finish before it or apply on
    /// top of it.
    pub async fn insert(
        &self,
        conversation_id: ConversationId,
        config: ConversationConfig,
    ) -> Result<ConversationState, ConversationStateError> {
        let config_value = serde_json::to_value(&config)
            .map_err(|e| ConversationStateError::InvalidUpdate(e.to_string()))?;

        let cached = self.slots.get(&conversation_id).map(|slot| slot.clone());
        if let Some(slot) = cached {
            if let Some(facets) = &slot.facets {
                let mut sub_tasks = facets.sub_tasks.lock().await;
                let mut scratchpad = facets.scratchpad.lock().await;
                let mut team_config = facets.team_config.lock().await;
                {
                    let _persist = slot.persist.lock().await;
                    self.replace_config(&conversation_id, config_value).await?;
                }
                *sub_tasks = Versioned {
                    value: config.sub_tasks.clone(),
                    version: config.versions.sub_tasks,
                };
                *scratchpad = Versioned {
                    value: config.shared_scratchpad.clone(),
                    version: config.versions.shared_scratchpad,
                };
                *team_config = Versioned {
                    value: config.team_config.clone(),
                    version: config.versions.team_config,
                };
                slot.touch();
                debug!(conversation_id = %conversation_id, "Conversation state replaced");
                return Ok(ConversationState::new(conversation_id, config));
            }
        }

        self.replace_config(&conversation_id, config_value).await?;
        self.slots.insert(
            conversation_id.clone(),
            Arc::new(ConversationSlot::new(Some(config.clone()))),
        );
        debug!(conversation_id = %conversation_id, "Conversation state created");
        Ok(ConversationState::new(conversation_id, config))
    }

    /// Current state, or `None` when no state exists (or it cannot be loaded).
    pub async fn get(&self, conversation_id: &ConversationId) -> Option<ConversationState> {
        match self.load(conversation_id).await {
            Ok(slot) => Some(snapshot(conversation_id, &slot).await),
            Err(ConversationStateError::NotFound(_)) => None,
            Err(err) => {
                warn!(conversation_id = %conversation_id, error = %err, "Failed to load conversation state");
                None
            }
        }
    }

    /// Drop the cached slot; the next access re-hydrates from persistence.
    pub fn evict(&self, conversation_id: &ConversationId) -> bool {
        self.slots.remove(conversation_id).is_some()
    }

    pub async fn update_team_config(
        &self,
        conversation_id: &ConversationId,
        team_config: TeamConfig,
        expected_version: Option<u64>,
        caller: Option<&CallerIdentity>,
    ) -> Result<SharedStateUpdateResult, ConversationStateError> {
        self.update_swarm_shared_state(
            conversation_id,
            SharedStateUpdate::TeamConfig(team_config),
            expected_version,
            caller,
        )
        .await
    }

    /// Apply a single-facet update.
    ///
    /// `expected_version`, when given, must equal the facet's current version.
    pub async fn update_swarm_shared_state(
        &self,
        conversation_id: &ConversationId,
        update: SharedStateUpdate,
        expected_version: Option<u64>,
        caller: Option<&CallerIdentity>,
    ) -> Result<SharedStateUpdateResult, ConversationStateError> {
        let slot = self.load(conversation_id).await?;
        let facets = slot
            .facets
            .as_ref()
            .ok_or_else(|| ConversationStateError::ConfigNotFound(conversation_id.clone()))?;
        let facet = update.facet();

        let result = match update {
            SharedStateUpdate::SubTasks { upsert, remove } => {
                let mut current = facets.sub_tasks.lock().await;
                check_version(facet, expected_version, current.version)?;
                let next = apply_sub_tasks(&current.value, &upsert, &remove)?;
                let version = current.version + 1;
                self.write_through(&slot, conversation_id, facet, json!(next), version)
                    .await?;
                current.value = next.clone();
                current.version = version;
                SharedStateUpdateResult {
                    updated_sub_tasks: Some(next),
                    updated_shared_scratchpad: None,
                    updated_team_config: None,
                    facet,
                    version,
                }
            }
            SharedStateUpdate::Scratchpad { set, remove } => {
                let mut current = facets.scratchpad.lock().await;
                check_version(facet, expected_version, current.version)?;
                let next = apply_scratchpad(&current.value, &set, &remove);
                let version = current.version + 1;
                self.write_through(
                    &slot,
                    conversation_id,
                    facet,
                    Value::Object(next.clone()),
                    version,
                )
                .await?;
                current.value = next.clone();
                current.version = version;
                SharedStateUpdateResult {
                    updated_sub_tasks: None,
                    updated_shared_scratchpad: Some(next),
                    updated_team_config: None,
                    facet,
                    version,
                }
            }
            SharedStateUpdate::TeamConfig(next) => {
                let caller = caller.ok_or(ConversationStateError::SessionUserRequired)?;
                let mut current = facets.team_config.lock().await;
                check_version(facet, expected_version, current.version)?;
                self.authorize_team_update(caller, current.value.as_ref(), &next)
                    .await?;
                let version = current.version + 1;
                let new_value = serde_json::to_value(&next)
                    .map_err(|e| ConversationStateError::InvalidUpdate(e.to_string()))?;
                self.write_through(&slot, conversation_id, facet, new_value, version)
                    .await?;
                current.value = Some(next.clone());
                current.version = version;
                SharedStateUpdateResult {
                    updated_sub_tasks: None,
                    updated_shared_scratchpad: None,
                    updated_team_config: Some(next),
                    facet,
                    version,
                }
            }
        };

        slot.touch();
        info!(
            conversation_id = %conversation_id,
            facet = %facet,
            version = result.version,
            "Shared state updated"
        );
        self.event_bus
            .publish_conversation_event(ConversationEvent::SharedStateUpdated {
                conversation_id: conversation_id.clone(),
                facet,
                version: result.version,
                updated_by: caller.map(|c| c.user_id.clone()),
                updated_at: Utc::now(),
            });
        Ok(result)
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Arc<ConversationSlot>, ConversationStateError> {
        if let Some(slot) = self.slots.get(conversation_id) {
            return Ok(slot.clone());
        }

        let record = self
            .persistence
            .read(ResourceKind::Chat, conversation_id.as_str())
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| ConversationStateError::NotFound(conversation_id.clone()))?;

        let config = match record.data.get("config") {
            None | Some(Value::Null) => None,
            Some(value) => match serde_json::from_value::<ConversationConfig>(value.clone()) {
                Ok(config) => Some(config),
                Err(err) => {
                    warn!(conversation_id = %conversation_id, error = %err, "Stored conversation config is malformed");
                    None
                }
            },
        };

        // A concurrent hydration may have won the race; keep its slot.
        let slot = self
            .slots
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(ConversationSlot::new(config)))
            .clone();
        Ok(slot)
    }

    /// Store `new_value` as the whole facet and bump its persisted version.
    async fn write_through(
        &self,
        slot: &ConversationSlot,
        conversation_id: &ConversationId,
        facet: Facet,
        new_value: Value,
        version: u64,
    ) -> Result<(), ConversationStateError> {
        let _persist = slot.persist.lock().await;
        let mut data = self.read_chat_data(conversation_id).await?;
        let mut config = take_object(data.remove("config"));
        let mut versions = take_object(config.remove("versions"));
        versions.insert(facet.as_str().to_string(), json!(version));
        config.insert(facet.as_str().to_string(), new_value);
        config.insert("versions".to_string(), Value::Object(versions));
        data.insert("config".to_string(), Value::Object(config));
        self.persistence
            .put(ResourceKind::Chat, conversation_id.as_str(), Value::Object(data))
            .await
            .map(|_| ())
            .map_err(persistence_error)
    }

    /// Replace the stored `config`, keeping the rest of the chat record.
    async fn replace_config(
        &self,
        conversation_id: &ConversationId,
        config: Value,
    ) -> Result<(), ConversationStateError> {
        let mut data = self.read_chat_data(conversation_id).await?;
        data.insert("config".to_string(), config);
        self.persistence
            .put(ResourceKind::Chat, conversation_id.as_str(), Value::Object(data))
            .await
            .map(|_| ())
            .map_err(persistence_error)
    }

    async fn read_chat_data(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Map<String, Value>, ConversationStateError> {
        let record = self
            .persistence
            .read(ResourceKind::Chat, conversation_id.as_str())
            .await
            .map_err(persistence_error)?;
        Ok(take_object(record.map(|r| r.data)))
    }

    /// The caller must own or belong to the team being configured, and to the
    /// team currently configured if it differs.
    async fn authorize_team_update(
        &self,
        caller: &CallerIdentity,
        current: Option<&TeamConfig>,
        next: &TeamConfig,
    ) -> Result<(), ConversationStateError> {
        let current_team = current.and_then(|c| c.team_id.as_deref());
        let next_team = next.team_id.as_deref();

        let mut teams: Vec<&str> = Vec::new();
        if let Some(team) = next_team.or(current_team) {
            teams.push(team);
        }
        if let (Some(current_team), Some(next_team)) = (current_team, next_team) {
            if current_team != next_team {
                teams.push(current_team);
            }
        }
        if teams.is_empty() {
            return Err(ConversationStateError::TeamNotFoundOrAccessDenied {
                team: "(unspecified)".to_string(),
            });
        }

        for team in teams {
            if !self.is_team_member(team, &caller.user_id).await? {
                return Err(ConversationStateError::TeamNotFoundOrAccessDenied {
                    team: team.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn is_team_member(&self, team_id: &str, user: &UserId) -> Result<bool, ConversationStateError> {
        let Some(record) = self
            .persistence
            .read(ResourceKind::Team, team_id)
            .await
            .map_err(persistence_error)?
        else {
            return Ok(false);
        };

        if record.data_str("ownerId") == Some(user.as_str()) {
            return Ok(true);
        }
        let is_member = record
            .data
            .get("members")
            .and_then(Value::as_array)
            .is_some_and(|members| members.iter().any(|m| m.as_str() == Some(user.as_str())));
        Ok(is_member)
    }
}

fn take_object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn check_version(
    facet: Facet,
    expected: Option<u64>,
    actual: u64,
) -> Result<(), ConversationStateError> {
    match expected {
        Some(expected) if expected != actual => Err(ConversationStateError::Stale {
            facet,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

async fn snapshot(conversation_id: &ConversationId, slot: &ConversationSlot) -> ConversationState {
    let updated_at = *slot.updated_at.lock();
    let config = match &slot.facets {
        Some(facets) => {
            let sub_tasks = facets.sub_tasks.lock().await;
            let scratchpad = facets.scratchpad.lock().await;
            let team_config = facets.team_config.lock().await;
            Some(ConversationConfig {
                sub_tasks: sub_tasks.value.clone(),
                shared_scratchpad: scratchpad.value.clone(),
                team_config: team_config.value.clone(),
                versions: FacetVersions {
                    sub_tasks: sub_tasks.version,
                    shared_scratchpad: scratchpad.version,
                    team_config: team_config.version,
                },
            })
        }
        None => None,
    };
    ConversationState {
        conversation_id: conversation_id.clone(),
        config,
        updated_at,
    }
}

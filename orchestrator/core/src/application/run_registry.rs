// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run Registry - process-wide index of live runs
//!
//! Wraps the generic [`Registry`] with run-specific control operations. Every
//! successful transition is published on the event bus; terminal runs are
//! reaped after the configured grace period.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::application::registry::{Managed, Registry, RegistryError, RegistryRecord};
use crate::domain::error::{Classify, ErrorKind};
use crate::domain::events::RunEvent;
use crate::domain::identity::UserId;
use crate::domain::run::{Run, RunError, RunId, RunState, RunTransition};
use crate::infrastructure::event_bus::EventBus;

impl Managed for Run {
    type Id = RunId;
    type Status = RunState;

    fn id(&self) -> RunId {
        self.id
    }

    fn owner(&self) -> &UserId {
        &self.user_id
    }

    fn status(&self) -> RunState {
        self.state()
    }

    fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

pub type RunRecord = RegistryRecord<RunId, RunState>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunControlError {
    #[error("Run {0} not found in active runs registry")]
    NotFound(RunId),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl Classify for RunControlError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Run(inner) => inner.kind(),
        }
    }
}

pub struct RunRegistry {
    runs: Arc<Registry<Run>>,
    event_bus: EventBus,
    reap_grace: Duration,
}

impl RunRegistry {
    pub fn new(event_bus: EventBus, reap_grace: Duration) -> Self {
        Self {
            runs: Arc::new(Registry::new("run", "loom_runs_registered")),
            event_bus,
            reap_grace,
        }
    }

    pub fn register(&self, run: Run) -> Result<RunRecord, RegistryError> {
        let event = RunEvent::RunRegistered {
            run_id: run.id,
            user_id: run.user_id.clone(),
            conversation_id: run.conversation_id.clone(),
            swarm_id: run.swarm_id(),
            registered_at: Utc::now(),
        };
        let record = self.runs.register(run)?;
        info!(run_id = %record.id, owner = %record.owner, "Run registered");
        self.event_bus.publish_run_event(event);
        Ok(record)
    }

    /// Snapshot of a live run; `None` if absent or already reaped.
    pub async fn get(&self, id: &RunId) -> Option<Run> {
        self.runs.get(id).await
    }

    pub fn get_ordered_records(&self) -> Vec<RunRecord> {
        self.runs.ordered_records()
    }

    pub fn deregister(&self, id: &RunId) -> bool {
        let removed = self.runs.deregister(id);
        if removed {
            self.event_bus.publish_run_event(RunEvent::RunDeregistered {
                run_id: *id,
                deregistered_at: Utc::now(),
            });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub async fn state(&self, id: &RunId) -> Result<RunState, RunControlError> {
        self.runs
            .with_instance(id, |run| run.state())
            .await
            .ok_or(RunControlError::NotFound(*id))
    }

    pub async fn start(&self, id: &RunId) -> Result<RunTransition, RunControlError> {
        self.transition(id, Run::start).await
    }

    pub async fn pause(&self, id: &RunId) -> Result<RunTransition, RunControlError> {
        self.transition(id, Run::pause).await
    }

    pub async fn resume(&self, id: &RunId) -> Result<RunTransition, RunControlError> {
        self.transition(id, Run::resume).await
    }

    pub async fn stop(
        &self,
        id: &RunId,
        reason: impl Into<String>,
    ) -> Result<RunTransition, RunControlError> {
        let reason = reason.into();
        self.transition(id, move |run| run.stop(reason)).await
    }

    pub async fn complete(&self, id: &RunId) -> Result<RunTransition, RunControlError> {
        self.transition(id, Run::complete).await
    }

    pub async fn fail(
        &self,
        id: &RunId,
        message: impl Into<String>,
    ) -> Result<RunTransition, RunControlError> {
        let message = message.into();
        self.transition(id, move |run| run.fail(message)).await
    }

    /// Advance the step cursor and add `credits` to the usage counters.
    pub async fn record_step(&self, id: &RunId, credits: u64) -> Result<u32, RunControlError> {
        self.runs
            .with_instance(id, |run| run.record_step(credits))
            .await
            .ok_or(RunControlError::NotFound(*id))?
            .map_err(RunControlError::from)
    }

    async fn transition(
        &self,
        id: &RunId,
        op: impl FnOnce(&mut Run) -> Result<RunTransition, RunError>,
    ) -> Result<RunTransition, RunControlError> {
        let (outcome, conversation_id) = self
            .runs
            .with_instance(id, |run| (op(run), run.conversation_id.clone()))
            .await
            .ok_or(RunControlError::NotFound(*id))?;
        let transition = outcome?;

        info!(
            run_id = %id,
            from = %transition.from,
            to = %transition.to,
            "Run transitioned"
        );
        self.event_bus.publish_run_event(RunEvent::RunTransitioned {
            run_id: *id,
            conversation_id,
            from: transition.from,
            to: transition.to,
            transitioned_at: transition.at,
        });

        if transition.to.is_terminal() {
            self.runs.schedule_reap(*id, self.reap_grace);
        }
        Ok(transition)
    }
}

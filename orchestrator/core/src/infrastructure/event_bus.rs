// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. Subscribers that
// act on behalf of one conversation (socket handlers, approval waiters) use
// `subscribe_conversation`, which drops events for every other conversation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::conversation::ConversationId;
use crate::domain::events::{ApprovalEvent, ConversationEvent, RunEvent, SwarmEvent};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Run(RunEvent),
    Swarm(SwarmEvent),
    Approval(ApprovalEvent),
    Conversation(ConversationEvent),
}

impl DomainEvent {
    /// Conversation the event belongs to, if any.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::Run(event) => event.conversation_id(),
            Self::Swarm(event) => Some(event.conversation_id()),
            Self::Approval(event) => Some(event.conversation_id()),
            Self::Conversation(event) => Some(event.conversation_id()),
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of buffered events before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    pub fn publish_run_event(&self, event: RunEvent) {
        self.publish(DomainEvent::Run(event));
    }

    pub fn publish_swarm_event(&self, event: SwarmEvent) {
        self.publish(DomainEvent::Swarm(event));
    }

    pub fn publish_approval_event(&self, event: ApprovalEvent) {
        self.publish(DomainEvent::Approval(event));
    }

    pub fn publish_conversation_event(&self, event: ConversationEvent) {
        self.publish(DomainEvent::Conversation(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single conversation.
    pub fn subscribe_conversation(&self, conversation_id: ConversationId) -> ConversationEventReceiver {
        ConversationEventReceiver {
            receiver: self.sender.subscribe(),
            conversation_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one conversation
pub struct ConversationEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    conversation_id: ConversationId,
}

impl ConversationEventReceiver {
    /// Next event for this conversation. Events for other conversations and
    /// events without a conversation are skipped.
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.conversation_id() == Some(&self.conversation_id) {
                return Ok(event);
            }
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

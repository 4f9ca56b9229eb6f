// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod approval_service;
pub mod event_bus;
pub mod persistence;
pub mod queue;

pub use approval_service::{ApprovalService, ApprovalTicket};
pub use event_bus::{DomainEvent, EventBus, EventBusError};
pub use persistence::InMemoryPersistence;
pub use queue::InMemoryTaskQueue;

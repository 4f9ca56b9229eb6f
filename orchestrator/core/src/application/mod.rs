// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod conversation_store;
pub mod registry;
pub mod run_registry;

pub use conversation_store::ConversationStore;
pub use registry::{Managed, Registry, RegistryError, RegistryRecord};
pub use run_registry::{RunControlError, RunRecord, RunRegistry};

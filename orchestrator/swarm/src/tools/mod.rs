// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool gateway: the closed set of agent-facing operations and the uniform
//! `{ isError, content }` envelope they answer with.

pub mod envelope;
pub mod error;
pub mod gateway;
pub mod operation;

mod resource_tools;
mod run_tools;
mod swarm_tools;

pub use envelope::{CallContext, ToolCallRequest, ToolContent, ToolResponse};
pub use error::ToolError;
pub use gateway::ToolGateway;
pub use operation::{ToolDescriptor, ToolOperation, BUILTIN_TOOLS};

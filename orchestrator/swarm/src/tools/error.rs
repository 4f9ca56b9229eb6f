// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt::Display;
use thiserror::Error;

use loom_core::domain::error::{Classify, ErrorKind};

use crate::tools::envelope::ToolResponse;

/// Failure of a single tool call. Rendered into an error envelope at the
/// gateway boundary and never returned to callers as a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },

    #[error("{message}")]
    Failed { kind: ErrorKind, message: String },
}

impl ToolError {
    pub fn invalid(tool: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool,
            message: message.into(),
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Wrap a component error, keeping its message verbatim.
    pub fn from_component<E: Classify + Display>(err: &E) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl Classify for ToolError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) | Self::InvalidArguments { .. } => ErrorKind::Validation,
            Self::Failed { kind, .. } => *kind,
        }
    }
}

impl From<ToolError> for ToolResponse {
    fn from(err: ToolError) -> Self {
        ToolResponse::error(err.to_string())
    }
}

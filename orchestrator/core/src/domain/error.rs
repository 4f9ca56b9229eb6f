// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Error Taxonomy
//!
//! Every component error in the orchestrator maps onto exactly one [`ErrorKind`].
//! Registries and state machines return these as discriminated results; the tool
//! gateway is the only place where they are rendered into caller-facing text.
//!
//! | Kind | Typical source |
//! |------|----------------|
//! | `NotFound` | run, swarm, conversation or approval absent |
//! | `InvalidState` | illegal lifecycle transition |
//! | `Unauthorized` | ownership / admin mismatch, missing session |
//! | `Validation` | bad tool arguments or attributes |
//! | `NotImplemented` | intentionally unsupported operation (`resume`) |
//! | `Timeout` | approval not resolved in time |
//! | `UpstreamFailure` | queue or persistence collaborator error |

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Unauthorized,
    Validation,
    NotImplemented,
    Timeout,
    UpstreamFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Unauthorized => "unauthorized",
            Self::Validation => "validation",
            Self::NotImplemented => "not_implemented",
            Self::Timeout => "timeout",
            Self::UpstreamFailure => "upstream_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every orchestrator error so callers can branch on the taxonomy
/// without matching each concrete enum.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

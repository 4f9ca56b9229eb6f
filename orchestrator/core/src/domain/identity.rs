// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Caller Identity
//!
//! Authentication happens upstream; the orchestrator receives an already verified
//! [`CallerIdentity`] (user id plus admin flag). Admin privilege can additionally be
//! granted through the platform-admin lookup exposed by [`AdminDirectory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A verified caller, as handed over by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: UserId,
    #[serde(default)]
    pub is_admin: bool,
}

impl CallerIdentity {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    /// True when the caller carries the admin flag or is the platform admin.
    pub async fn has_admin_privilege(&self, directory: &dyn AdminDirectory) -> bool {
        if self.is_admin {
            return true;
        }
        directory
            .platform_admin_id()
            .await
            .is_some_and(|admin| admin == self.user_id)
    }
}

/// Platform-admin lookup.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn platform_admin_id(&self) -> Option<UserId>;
}

/// Admin directory backed by a single configured admin id.
#[derive(Debug, Clone, Default)]
pub struct StaticAdminDirectory {
    admin: Option<UserId>,
}

impl StaticAdminDirectory {
    pub fn new(admin: Option<UserId>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl AdminDirectory for StaticAdminDirectory {
    async fn platform_admin_id(&self) -> Option<UserId> {
        self.admin.clone()
    }
}

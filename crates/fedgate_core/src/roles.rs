/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway_db::GatewayDb;
pub use crate::gateway_db::Role;

/// Source of truth for which local actors may moderate.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn roles_of(&self, actor_id: &str) -> Result<Vec<Role>>;
}

#[async_trait]
impl RoleDirectory for GatewayDb {
    async fn roles_of(&self, actor_id: &str) -> Result<Vec<Role>> {
        let actor_id = actor_id.to_string();
        self.call(move |db| db.list_roles(&actor_id)).await
    }
}

/// Ok with the trimmed caller id when it holds moderator or administrator.
/// Anonymous and unknown callers are refused.
pub async fn require_moderator(roles: &dyn RoleDirectory, caller: Option<&str>) -> GatewayResult<String> {
    let caller = caller.map(str::trim).filter(|c| !c.is_empty());
    let Some(caller) = caller else {
        return Err(GatewayError::PermissionDenied("caller not identified".to_string()));
    };
    let held = roles.roles_of(caller).await.map_err(GatewayError::storage)?;
    if held.iter().any(|r| matches!(r, Role::Moderator | Role::Administrator)) {
        return Ok(caller.to_string());
    }
    warn!(caller, "moderation action refused");
    Err(GatewayError::PermissionDenied(format!("{caller} is not a moderator")))
}

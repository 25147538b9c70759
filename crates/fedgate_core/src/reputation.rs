/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway_db::{now_ms, GatewayDb, HostReputation};
pub use crate::gateway_db::HostStatus;
use crate::hosts::{host_from_url, normalize_host, wildcard_candidates};
use crate::roles::{require_moderator, RoleDirectory};

/// Operator-maintained trust labels per remote host. No row means `normal`.
#[derive(Clone)]
pub struct ReputationStore {
    db: GatewayDb,
    roles: Arc<dyn RoleDirectory>,
}

impl ReputationStore {
    pub fn new(db: GatewayDb, roles: Arc<dyn RoleDirectory>) -> Self {
        Self { db, roles }
    }

    pub async fn get_status(&self, host: &str) -> GatewayResult<HostStatus> {
        Ok(self
            .lookup(host)
            .await?
            .map(|r| r.status)
            .unwrap_or(HostStatus::Normal))
    }

    /// The row governing `host`: its own row, else the most specific `*.` pattern.
    pub async fn lookup(&self, host: &str) -> GatewayResult<Option<HostReputation>> {
        let host = normalize_host(host);
        if host.is_empty() {
            return Ok(None);
        }
        Ok(self
            .db
            .call(move |db| {
                if let Some(row) = db.get_host_reputation(&host)? {
                    return Ok(Some(row));
                }
                for pattern in wildcard_candidates(&host) {
                    if let Some(row) = db.get_host_reputation(&pattern)? {
                        return Ok(Some(row));
                    }
                }
                Ok(None)
            })
            .await?)
    }

    pub async fn set_status(
        &self,
        host: &str,
        status: HostStatus,
        reason: &str,
        caller: Option<&str>,
    ) -> GatewayResult<HostReputation> {
        let caller = require_moderator(self.roles.as_ref(), caller).await?;
        let host = validate_host_key(host)?;
        let row = HostReputation {
            host,
            status,
            reason: reason.trim().to_string(),
            updated_by: caller,
            updated_at_ms: now_ms(),
        };
        let r = row.clone();
        self.db.call(move |db| db.upsert_host_reputation(&r)).await?;
        info!(host = %row.host, status = row.status.as_str(), by = %row.updated_by, "host reputation set");
        Ok(row)
    }

    pub async fn remove(&self, host: &str, caller: Option<&str>) -> GatewayResult<bool> {
        let caller = require_moderator(self.roles.as_ref(), caller).await?;
        let host = validate_host_key(host)?;
        let h = host.clone();
        let removed = self.db.call(move |db| db.delete_host_reputation(&h)).await?;
        info!(%host, %caller, removed, "host reputation removed");
        Ok(removed)
    }

    pub async fn list(&self, limit: u32) -> GatewayResult<Vec<HostReputation>> {
        Ok(self.db.call(move |db| db.list_host_reputations(limit)).await?)
    }

    /// Status of the host serving `actor_url`; references without a host are `normal`.
    pub async fn status_for_actor(&self, actor_url: &str) -> GatewayResult<HostStatus> {
        match host_from_url(actor_url) {
            Some(host) => self.get_status(&host).await,
            None => Ok(HostStatus::Normal),
        }
    }

    /// Adds `moderationStatus` to each remote-sourced feed item. Items without an
    /// actor reference are left untouched.
    pub async fn annotate_items(&self, items: &mut [Value]) -> GatewayResult<()> {
        let mut seen: HashMap<String, HostStatus> = HashMap::new();
        for item in items.iter_mut() {
            let Some(host) = item_actor(item).and_then(|a| host_from_url(&a)) else {
                continue;
            };
            let status = match seen.get(&host) {
                Some(s) => *s,
                None => {
                    let s = self.get_status(&host).await?;
                    seen.insert(host, s);
                    s
                }
            };
            if let Some(obj) = item.as_object_mut() {
                obj.insert("moderationStatus".to_string(), Value::String(status.as_str().to_string()));
            }
        }
        Ok(())
    }
}

fn item_actor(item: &Value) -> Option<String> {
    ["actor", "attributedTo", "id"].iter().find_map(|k| match item.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("id").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    })
}

fn validate_host_key(host: &str) -> GatewayResult<String> {
    let host = normalize_host(host);
    let bare = host.strip_prefix("*.").unwrap_or(&host);
    let ok = !bare.is_empty()
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' || c == ':');
    if !ok {
        return Err(GatewayError::InvalidInput(format!("host {host:?}")));
    }
    Ok(host)
}

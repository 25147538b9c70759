/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use fedgate_protocol::IdentityDocument;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::GatewayResult;
use crate::gateway_db::{now_ms, CacheEntry, CacheWrite, GatewayDb};

/// Durable `identity_url -> document` cache with an optional in-process layer.
///
/// The database is the source of truth; the memory layer only saves a
/// round trip and may be disabled without changing any result.
#[derive(Clone)]
pub struct IdentityCache {
    db: GatewayDb,
    memory: Option<Arc<RwLock<HashMap<String, CacheEntry>>>>,
    max_memory_entries: usize,
    ttl: Duration,
}

impl IdentityCache {
    pub fn new(db: GatewayDb, ttl: Duration, memory_enabled: bool, max_memory_entries: usize) -> Self {
        let memory = (memory_enabled && max_memory_entries > 0).then(|| Arc::new(RwLock::new(HashMap::new())));
        Self {
            db,
            memory,
            max_memory_entries,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, identity_url: &str) -> GatewayResult<Option<CacheEntry>> {
        if let Some(mem) = &self.memory {
            if let Some(hit) = mem.read().await.get(identity_url) {
                return Ok(Some(hit.clone()));
            }
        }
        let url = identity_url.to_string();
        let entry = self.db.call(move |db| db.get_cache_entry(&url)).await?;
        if let Some(e) = &entry {
            self.remember(e.clone()).await;
        }
        Ok(entry)
    }

    /// Cache-warming touch: bumps `fetched_at` without re-validating. Failures are logged only.
    pub async fn touch(&self, identity_url: &str) {
        let now = now_ms();
        let url = identity_url.to_string();
        if let Err(e) = self.db.call(move |db| db.touch_cache_entry(&url, now)).await {
            warn!(identity_url, "cache touch failed: {e:#}");
        }
        if let Some(mem) = &self.memory {
            if let Some(e) = mem.write().await.get_mut(identity_url) {
                e.fetched_at_ms = e.fetched_at_ms.max(now);
            }
        }
    }

    pub async fn upsert(&self, identity_url: &str, document: &IdentityDocument) -> GatewayResult<CacheWrite> {
        self.upsert_at(identity_url, document, now_ms()).await
    }

    pub async fn upsert_at(
        &self,
        identity_url: &str,
        document: &IdentityDocument,
        fetched_at_ms: i64,
    ) -> GatewayResult<CacheWrite> {
        let url = identity_url.to_string();
        let doc = document.clone();
        let outcome = self
            .db
            .call(move |db| db.upsert_cache_entry(&url, &doc, fetched_at_ms))
            .await?;
        match outcome {
            CacheWrite::Created | CacheWrite::Replaced { .. } => {
                self.remember(CacheEntry {
                    identity_url: identity_url.to_string(),
                    document: document.clone(),
                    fetched_at_ms,
                    stored_at_ms: fetched_at_ms,
                })
                .await;
            }
            CacheWrite::Ignored { newer_fetched_at_ms } => {
                debug!(identity_url, newer_fetched_at_ms, "ignored out-of-order cache write");
                self.forget(identity_url).await;
            }
        }
        Ok(outcome)
    }

    pub async fn invalidate(&self, identity_url: &str) -> GatewayResult<bool> {
        self.forget(identity_url).await;
        let url = identity_url.to_string();
        let removed = self.db.call(move |db| db.delete_cache_entry(&url)).await?;
        info!(identity_url, removed, "identity cache entry invalidated");
        Ok(removed)
    }

    pub async fn clear(&self) -> GatewayResult<u64> {
        if let Some(mem) = &self.memory {
            mem.write().await.clear();
        }
        let n = self.db.call(|db| db.clear_cache()).await?;
        info!(removed = n, "identity cache cleared");
        Ok(n)
    }

    pub async fn len(&self) -> GatewayResult<u64> {
        Ok(self.db.call(|db| db.count_cache_entries()).await?)
    }

    pub fn is_stale(&self, entry: &CacheEntry, now_ms: i64) -> bool {
        now_ms.saturating_sub(entry.stored_at_ms) > self.ttl.as_millis() as i64
    }

    /// Identity URLs whose stored document is older than the TTL, oldest first.
    pub async fn stale_entries(&self, limit: u32) -> GatewayResult<Vec<String>> {
        self.stale_entries_at(now_ms(), limit).await
    }

    pub async fn stale_entries_at(&self, now_ms: i64, limit: u32) -> GatewayResult<Vec<String>> {
        let cutoff = now_ms.saturating_sub(self.ttl.as_millis() as i64);
        Ok(self.db.call(move |db| db.list_stale_cache_urls(cutoff, limit)).await?)
    }

    async fn remember(&self, entry: CacheEntry) {
        let Some(mem) = &self.memory else { return };
        let mut g = mem.write().await;
        if g.len() >= self.max_memory_entries && !g.contains_key(&entry.identity_url) {
            let oldest = g
                .iter()
                .min_by_key(|(_, e)| e.fetched_at_ms)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                g.remove(&k);
            }
        }
        g.insert(entry.identity_url.clone(), entry);
    }

    async fn forget(&self, identity_url: &str) {
        if let Some(mem) = &self.memory {
            mem.write().await.remove(identity_url);
        }
    }
}

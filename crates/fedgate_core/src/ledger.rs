/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Append-only log of outbound calls per remote host, with windowed
//! aggregates used by operators to spot misbehaving peers.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::GatewayResult;
use crate::gateway_db::{now_ms, GatewayDb, HotHost, RequestLogEntry};
use crate::hosts::normalize_host;
use crate::metrics::GatewayMetrics;
use crate::roles::{require_moderator, RoleDirectory};

const WINDOW_ENTRY_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct Ledger {
    db: GatewayDb,
    roles: Arc<dyn RoleDirectory>,
    metrics: Arc<GatewayMetrics>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WindowCount {
    pub count: u64,
    /// Most recent entries first, capped.
    pub entries: Vec<RequestLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostStats {
    pub host: String,
    pub count: u64,
    pub failures: u64,
    pub median_latency_ms: Option<i64>,
}

impl Ledger {
    pub fn new(db: GatewayDb, roles: Arc<dyn RoleDirectory>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { db, roles, metrics }
    }

    /// Never fails: a lost log row is reported, not propagated.
    pub async fn record_attempt(&self, host: &str, success: bool, latency_ms: i64) {
        self.record_attempt_at(host, now_ms(), success, latency_ms).await
    }

    pub async fn record_attempt_at(&self, host: &str, timestamp_ms: i64, success: bool, latency_ms: i64) {
        let entry = RequestLogEntry {
            remote_host: normalize_host(host),
            timestamp_ms,
            success,
            latency_ms: latency_ms.max(0),
        };
        if let Err(e) = self.db.call(move |db| db.insert_request_log(&entry)).await {
            self.metrics.ledger_write_failure();
            warn!(host, "request ledger write failed: {e:#}");
        }
    }

    pub async fn count_in_window(&self, host: &str, window: Duration) -> GatewayResult<WindowCount> {
        self.count_in_window_at(host, window, now_ms()).await
    }

    pub async fn count_in_window_at(&self, host: &str, window: Duration, now_ms: i64) -> GatewayResult<WindowCount> {
        let host = normalize_host(host);
        let since = window_start(now_ms, window);
        let (count, entries) = self
            .db
            .call(move |db| {
                let count = db.count_requests_between(&host, since, now_ms)?;
                let entries = db.list_requests_between(&host, since, now_ms, WINDOW_ENTRY_LIMIT)?;
                Ok((count, entries))
            })
            .await?;
        Ok(WindowCount { count, entries })
    }

    /// Hosts whose windowed count is strictly above `threshold`, busiest first.
    pub async fn list_hot_hosts(&self, threshold: u64, window: Duration) -> GatewayResult<Vec<HotHost>> {
        self.list_hot_hosts_at(threshold, window, now_ms()).await
    }

    pub async fn list_hot_hosts_at(&self, threshold: u64, window: Duration, now_ms: i64) -> GatewayResult<Vec<HotHost>> {
        let since = window_start(now_ms, window);
        Ok(self.db.call(move |db| db.list_hot_hosts(since, now_ms, threshold)).await?)
    }

    pub async fn host_stats(&self, host: &str, window: Duration) -> GatewayResult<HostStats> {
        self.host_stats_at(host, window, now_ms()).await
    }

    pub async fn host_stats_at(&self, host: &str, window: Duration, now_ms: i64) -> GatewayResult<HostStats> {
        let host = normalize_host(host);
        let since = window_start(now_ms, window);
        let h = host.clone();
        let outcomes = self
            .db
            .call(move |db| db.request_outcomes_between(&h, since, now_ms))
            .await?;
        let failures = outcomes.iter().filter(|(ok, _)| !ok).count() as u64;
        let mut latencies: Vec<i64> = outcomes.iter().map(|(_, l)| *l).collect();
        Ok(HostStats {
            host,
            count: outcomes.len() as u64,
            failures,
            median_latency_ms: median(&mut latencies),
        })
    }

    /// Drops rows older than the retention cutoff.
    pub async fn prune_before(&self, cutoff_ms: i64) -> GatewayResult<u64> {
        let n = self.db.call(move |db| db.prune_requests_before(cutoff_ms)).await?;
        if n > 0 {
            info!(removed = n, "pruned request ledger");
        }
        Ok(n)
    }

    /// Deletes every row for `host`. Moderators and administrators only.
    pub async fn purge(&self, host: &str, caller: Option<&str>) -> GatewayResult<u64> {
        let caller = require_moderator(self.roles.as_ref(), caller).await?;
        let host = normalize_host(host);
        let h = host.clone();
        let n = self.db.call(move |db| db.delete_requests_for_host(&h)).await?;
        info!(%host, %caller, removed = n, "purged request ledger for host");
        Ok(n)
    }
}

fn window_start(now_ms: i64, window: Duration) -> i64 {
    now_ms.saturating_sub(window.as_millis().min(i64::MAX as u128) as i64)
}

fn median(values: &mut [i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2)
    }
}

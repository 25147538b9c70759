/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct GatewayMetrics {
    pub outbound_ok: AtomicU64,
    pub outbound_errors: AtomicU64,
    pub outbound_timeouts: AtomicU64,
    pub outbound_rtt_ema_ms: AtomicU64,

    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub stub_fallbacks: AtomicU64,
    pub registrations_created: AtomicU64,
    pub ledger_write_failures: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbound_ok(&self, latency_ms: u64) {
        self.outbound_ok.fetch_add(1, Ordering::Relaxed);
        self.rtt_update(latency_ms);
    }

    pub fn outbound_error(&self) {
        self.outbound_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn outbound_timeout(&self) {
        self.outbound_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn rtt_update(&self, ms: u64) {
        if ms == 0 {
            return;
        }
        let prev = self.outbound_rtt_ema_ms.load(Ordering::Relaxed);
        let next = if prev == 0 {
            ms
        } else {
            (prev.saturating_mul(7).saturating_add(ms)) / 8
        };
        self.outbound_rtt_ema_ms.store(next, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stub_fallback(&self) {
        self.stub_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registration_created(&self) {
        self.registrations_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ledger_write_failure(&self) {
        self.ledger_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::json!({
            "outbound": {
                "ok": self.outbound_ok.load(Ordering::Relaxed),
                "errors": self.outbound_errors.load(Ordering::Relaxed),
                "timeouts": self.outbound_timeouts.load(Ordering::Relaxed),
                "rtt_ema_ms": self.outbound_rtt_ema_ms.load(Ordering::Relaxed),
            },
            "cache": {
                "hits": self.cache_hits.load(Ordering::Relaxed),
                "misses": self.cache_misses.load(Ordering::Relaxed),
                "stub_fallbacks": self.stub_fallbacks.load(Ordering::Relaxed),
            },
            "registrations_created": self.registrations_created.load(Ordering::Relaxed),
            "ledger_write_failures": self.ledger_write_failures.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtt_ema_weights_history() {
        let m = GatewayMetrics::new();
        m.outbound_ok(80);
        m.outbound_ok(160);
        let snap = m.snapshot_json();
        assert_eq!(snap["outbound"]["ok"], 2);
        assert_eq!(snap["outbound"]["rtt_ema_ms"], 90);
    }
}

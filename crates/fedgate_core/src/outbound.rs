/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::hosts::host_from_url;
use crate::http_retry::send_with_retry;
use crate::ledger::Ledger;
use crate::metrics::GatewayMetrics;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Why a remote call produced no usable body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutboundFailure {
    #[error("invalid url")]
    InvalidUrl,
    #[error("timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("unreadable body: {0}")]
    Body(String),
}

/// Every call to a remote server goes through here: one hard deadline per
/// logical call and one ledger row per logical call.
#[derive(Clone)]
pub struct OutboundClient {
    http: reqwest::Client,
    ledger: Ledger,
    metrics: Arc<GatewayMetrics>,
    timeout: Duration,
    attempts: u32,
}

impl OutboundClient {
    pub fn new(cfg: &GatewayConfig, ledger: Ledger, metrics: Arc<GatewayMetrics>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.http_timeout())
            .redirect(reqwest::redirect::Policy::limited(3));
        if !cfg.use_env_proxy {
            builder = builder.no_proxy();
        }
        let http = builder.build().context("build http client")?;
        Ok(Self {
            http,
            ledger,
            metrics,
            timeout: cfg.http_timeout(),
            attempts: cfg.http_attempts,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, accept: &str) -> Result<T, OutboundFailure> {
        let accept = accept.to_string();
        self.execute(url, self.attempts, || self.http.get(url).header(ACCEPT, accept.as_str()))
            .await
    }

    /// Single attempt; registration endpoints are not idempotent.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, OutboundFailure> {
        self.execute(url, 1, || {
            self.http
                .post(url)
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json")
                .json(body)
        })
        .await
    }

    async fn execute<T, F>(&self, url: &str, attempts: u32, build: F) -> Result<T, OutboundFailure>
    where
        T: DeserializeOwned,
        F: FnMut() -> RequestBuilder,
    {
        let host = host_from_url(url).ok_or(OutboundFailure::InvalidUrl)?;
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, async {
            let resp = send_with_retry(build, attempts).await.map_err(|e| {
                if e.is_timeout() {
                    OutboundFailure::Timeout
                } else {
                    OutboundFailure::Transport(e.to_string())
                }
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OutboundFailure::Status(status.as_u16()));
            }
            read_capped(resp, MAX_BODY_BYTES).await
        })
        .await
        .unwrap_or(Err(OutboundFailure::Timeout));
        let latency_ms = started.elapsed().as_millis() as i64;

        match &outcome {
            Ok(_) => self.metrics.outbound_ok(latency_ms as u64),
            Err(OutboundFailure::Timeout) => self.metrics.outbound_timeout(),
            Err(_) => self.metrics.outbound_error(),
        }
        self.ledger.record_attempt(&host, outcome.is_ok(), latency_ms).await;

        let body = outcome.map_err(|e| {
            debug!(%url, latency_ms, "outbound call failed: {e}");
            e
        })?;
        serde_json::from_slice(&body).map_err(|e| OutboundFailure::Body(e.to_string()))
    }
}

/// Reads at most `limit` bytes; a declared or streamed body beyond it is refused
/// without buffering the rest.
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> Result<Vec<u8>, OutboundFailure> {
    if let Some(len) = resp.content_length() {
        if len > limit as u64 {
            return Err(OutboundFailure::Body(format!("body too large: {len} bytes")));
        }
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| OutboundFailure::Body(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(OutboundFailure::Body(format!("body exceeds {limit} bytes")));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

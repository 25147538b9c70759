/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use fedgate_core::config::GatewayConfig;
use fedgate_core::http_api;
use fedgate_core::Gateway;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info, warn};

const LEDGER_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

fn load_config() -> Result<GatewayConfig> {
    let mut args = std::env::args().skip(1);
    let mut path = std::env::var("FEDGATE_CONFIG").ok().filter(|p| !p.trim().is_empty());
    while let Some(arg) = args.next() {
        if arg == "--config" {
            path = Some(args.next().context("--config needs a path")?);
        }
    }
    match path {
        Some(p) => GatewayConfig::from_file(p),
        None => Ok(GatewayConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = load_config()?;
    let addr: SocketAddr = cfg.bind.parse().with_context(|| format!("invalid bind address {}", cfg.bind))?;
    let sweep_secs = cfg.cache_sweep_interval_secs;
    let gw = Gateway::open(cfg)?;
    info!(domain = %gw.cfg.domain, base = %gw.cfg.public_base_url, "gateway configured");
    if gw.cfg.internal_token.is_none() {
        warn!("no internal_token configured: moderation endpoints refuse every caller");
    }

    if sweep_secs > 0 {
        let sweep = gw.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs.max(30)));
            loop {
                interval.tick().await;
                if let Err(e) = sweep.resolver.refresh_stale(200).await {
                    error!("identity cache sweep failed: {e}");
                }
                let cutoff = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as i64
                    - LEDGER_RETENTION_MS;
                if let Err(e) = sweep.ledger.prune_before(cutoff).await {
                    error!("request ledger prune failed: {e}");
                }
            }
        });
    }

    let app = http_api::router(gw);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("fedgate listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

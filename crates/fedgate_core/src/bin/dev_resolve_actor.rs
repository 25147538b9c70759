/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use fedgate_core::config::GatewayConfig;
use fedgate_core::resolver::IdentityRef;
use fedgate_core::Gateway;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let input = env::args().nth(1).unwrap_or_default();
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("usage: dev_resolve_actor <actor_url | user@domain>");
    }

    let gw = Gateway::open(GatewayConfig::from_env())?;
    let res = if input.contains("://") {
        gw.resolver.resolve_detailed(IdentityRef::parse(input)).await?
    } else {
        gw.resolver.resolve_handle(input).await?
    };
    println!("source={}", serde_json::to_string(&res.source)?);
    println!("{}", serde_json::to_string_pretty(&res.document)?);
    Ok(())
}

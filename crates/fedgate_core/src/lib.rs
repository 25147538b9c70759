/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Federation gateway: resolves remote identities, bootstraps cross-instance
//! login, keeps per-host traffic and reputation records, and publishes this
//! instance's own actors.

pub mod config;
pub mod error;
pub mod federated_auth;
pub mod gateway_db;
pub mod hosts;
pub mod http_api;
pub mod http_retry;
pub mod identity_cache;
pub mod ledger;
pub mod metrics;
pub mod outbound;
pub mod publisher;
pub mod reputation;
pub mod resolver;
pub mod roles;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use config::GatewayConfig;
use federated_auth::FederatedAuth;
use gateway_db::GatewayDb;
use identity_cache::IdentityCache;
use ledger::Ledger;
use metrics::GatewayMetrics;
use outbound::OutboundClient;
use publisher::{LocalActorStore, Publisher};
use reputation::ReputationStore;
use resolver::Resolver;
use roles::RoleDirectory;

/// All gateway components wired over one database.
#[derive(Clone)]
pub struct Gateway {
    pub cfg: Arc<GatewayConfig>,
    pub db: GatewayDb,
    pub metrics: Arc<GatewayMetrics>,
    pub cache: IdentityCache,
    pub ledger: Ledger,
    pub resolver: Resolver,
    pub reputation: ReputationStore,
    pub auth: FederatedAuth,
    pub publisher: Publisher,
    pub roles: Arc<dyn RoleDirectory>,
}

impl Gateway {
    /// Opens the database under the configured data dir; it also serves as
    /// local actor store and role directory.
    pub fn open(cfg: GatewayConfig) -> Result<Self> {
        let db = GatewayDb::open(cfg.db_path()?)?;
        let actors: Arc<dyn LocalActorStore> = Arc::new(db.clone());
        let roles: Arc<dyn RoleDirectory> = Arc::new(db.clone());
        Self::with_collaborators(cfg, db, actors, roles)
    }

    pub fn with_collaborators(
        cfg: GatewayConfig,
        db: GatewayDb,
        actors: Arc<dyn LocalActorStore>,
        roles: Arc<dyn RoleDirectory>,
    ) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new());
        let cache = IdentityCache::new(
            db.clone(),
            cfg.cache_ttl(),
            cfg.memory_cache_enabled,
            cfg.memory_cache_max_entries,
        );
        let ledger = Ledger::new(db.clone(), roles.clone(), metrics.clone());
        let outbound = OutboundClient::new(&cfg, ledger.clone(), metrics.clone())?;
        let resolver = Resolver::new(cache.clone(), outbound.clone(), metrics.clone(), cfg.remote_scheme.clone());
        let reputation = ReputationStore::new(db.clone(), roles.clone());
        let auth = FederatedAuth::new(
            db.clone(),
            resolver.clone(),
            outbound,
            metrics.clone(),
            cfg.instance_name.clone(),
            cfg.instance_website.clone(),
            cfg.oauth_scopes.clone(),
            cfg.remote_scheme.clone(),
            Duration::from_secs(cfg.state_max_age_secs),
        );
        let publisher = Publisher::new(actors, &cfg.public_base_url, &cfg.domain, cfg.page_size);
        Ok(Self {
            cfg: Arc::new(cfg),
            db,
            metrics,
            cache,
            ledger,
            resolver,
            reputation,
            auth,
            publisher,
            roles,
        })
    }
}

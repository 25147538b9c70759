/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Turns identity references into identity documents: embedded documents pass
//! through, URLs go cache first, then a bounded network fetch, then a stub.

use fedgate_protocol::{IdentityDocument, Webfinger, ACCEPT_ACTIVITY, ACCEPT_JRD};
use std::sync::Arc;
use tracing::{debug, info, warn};
use urlencoding::encode;

use crate::error::{GatewayError, GatewayResult};
use crate::federated_auth::{parse_handle, Handle};
use crate::hosts::{host_from_url, last_path_segment};
use crate::identity_cache::IdentityCache;
use crate::metrics::GatewayMetrics;
use crate::outbound::{OutboundClient, OutboundFailure};

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityRef {
    /// Locally authored content carries its author inline.
    Embedded(IdentityDocument),
    Url(String),
}

impl IdentityRef {
    /// A JSON object is taken as an embedded document, anything else as a URL.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            if let Ok(doc) = serde_json::from_str::<IdentityDocument>(trimmed) {
                return IdentityRef::Embedded(doc);
            }
        }
        IdentityRef::Url(trimmed.to_string())
    }
}

impl From<IdentityDocument> for IdentityRef {
    fn from(doc: IdentityDocument) -> Self {
        IdentityRef::Embedded(doc)
    }
}

impl From<&str> for IdentityRef {
    fn from(url: &str) -> Self {
        IdentityRef::Url(url.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Embedded,
    Cache,
    Network,
    Stub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub document: IdentityDocument,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RefreshReport {
    pub checked: u64,
    pub refreshed: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct Resolver {
    cache: IdentityCache,
    outbound: OutboundClient,
    metrics: Arc<GatewayMetrics>,
    remote_scheme: String,
}

impl Resolver {
    pub fn new(
        cache: IdentityCache,
        outbound: OutboundClient,
        metrics: Arc<GatewayMetrics>,
        remote_scheme: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            outbound,
            metrics,
            remote_scheme: remote_scheme.into(),
        }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub async fn resolve(&self, identity: IdentityRef) -> GatewayResult<IdentityDocument> {
        Ok(self.resolve_detailed(identity).await?.document)
    }

    pub async fn resolve_detailed(&self, identity: IdentityRef) -> GatewayResult<Resolution> {
        let url = match identity {
            IdentityRef::Embedded(document) => {
                return Ok(Resolution {
                    document,
                    source: ResolutionSource::Embedded,
                })
            }
            IdentityRef::Url(url) => url,
        };

        if !is_fetchable(&url) {
            debug!(reference = %url, "unresolvable identity reference");
            return Ok(self.stub(&url));
        }

        if let Some(hit) = self.cache.get(&url).await? {
            self.metrics.cache_hit();
            self.cache.touch(&url).await;
            return Ok(Resolution {
                document: hit.document,
                source: ResolutionSource::Cache,
            });
        }
        self.metrics.cache_miss();

        match self.fetch_document(&url).await {
            Ok(document) => {
                if let Err(e) = self.cache.upsert(&url, &document).await {
                    warn!(%url, "caching fetched identity failed: {e}");
                }
                Ok(Resolution {
                    document,
                    source: ResolutionSource::Network,
                })
            }
            Err(e) => {
                info!(%url, "identity fetch failed, using stub: {e}");
                Ok(self.stub(&url))
            }
        }
    }

    /// Discovery then resolution; every failure is terminal here.
    pub async fn resolve_handle(&self, handle: &str) -> GatewayResult<Resolution> {
        let handle = parse_handle(handle)?;
        let jrd = self.discover(&handle).await?;
        let Some(self_link) = jrd.self_link() else {
            return Err(GatewayError::NotFound(format!("{} has no identity link", handle.acct())));
        };
        let url = self_link.to_string();
        if let Some(hit) = self.cache.get(&url).await? {
            self.metrics.cache_hit();
            self.cache.touch(&url).await;
            return Ok(Resolution {
                document: hit.document,
                source: ResolutionSource::Cache,
            });
        }
        let document = self.fetch_document(&url).await.map_err(|e| match e {
            OutboundFailure::Timeout | OutboundFailure::Transport(_) => GatewayError::Unreachable {
                host: handle.domain.clone(),
                detail: e.to_string(),
            },
            _ => GatewayError::NotFound(format!("could not find user {}", handle.acct())),
        })?;
        if let Err(e) = self.cache.upsert(&url, &document).await {
            warn!(%url, "caching fetched identity failed: {e}");
        }
        Ok(Resolution {
            document,
            source: ResolutionSource::Network,
        })
    }

    /// WebFinger lookup for `handle` on its own server.
    pub async fn discover(&self, handle: &Handle) -> GatewayResult<Webfinger> {
        let url = format!(
            "{}://{}/.well-known/webfinger?resource={}",
            self.remote_scheme,
            handle.domain,
            encode(&format!("acct:{}", handle.acct()))
        );
        self.outbound
            .get_json::<Webfinger>(&url, ACCEPT_JRD)
            .await
            .map_err(|e| match e {
                OutboundFailure::Timeout | OutboundFailure::Transport(_) => GatewayError::Unreachable {
                    host: handle.domain.clone(),
                    detail: e.to_string(),
                },
                _ => GatewayError::NotFound(format!("could not find user {}", handle.acct())),
            })
    }

    /// Re-fetches cache entries past the TTL. A failed refresh keeps the old document.
    pub async fn refresh_stale(&self, limit: u32) -> GatewayResult<RefreshReport> {
        let stale = self.cache.stale_entries(limit).await?;
        let mut report = RefreshReport::default();
        for url in stale {
            report.checked += 1;
            match self.fetch_document(&url).await {
                Ok(doc) => {
                    self.cache.upsert(&url, &doc).await?;
                    report.refreshed += 1;
                }
                Err(e) => {
                    debug!(%url, "stale identity refresh failed: {e}");
                    report.failed += 1;
                }
            }
        }
        if report.checked > 0 {
            info!(
                checked = report.checked,
                refreshed = report.refreshed,
                failed = report.failed,
                "identity cache refresh"
            );
        }
        Ok(report)
    }

    async fn fetch_document(&self, url: &str) -> Result<IdentityDocument, OutboundFailure> {
        let doc: IdentityDocument = self.outbound.get_json(url, ACCEPT_ACTIVITY).await?;
        let Some(id) = doc.id.as_deref() else {
            return Err(OutboundFailure::Body("document has no id".to_string()));
        };
        if host_from_url(id) != host_from_url(url) {
            return Err(OutboundFailure::Body(format!("document id {id} is not hosted at {url}")));
        }
        Ok(doc)
    }

    fn stub(&self, reference: &str) -> Resolution {
        self.metrics.stub_fallback();
        Resolution {
            document: IdentityDocument::stub(&last_path_segment(reference)),
            source: ResolutionSource::Stub,
        }
    }
}

fn is_fetchable(url: &str) -> bool {
    (url.starts_with("https://") || url.starts_with("http://")) && host_from_url(url).is_some()
}

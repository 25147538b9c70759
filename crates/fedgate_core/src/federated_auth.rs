/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Cross-instance login bootstrap: discovery, dynamic client registration
//! and the authorization redirect with its anti-CSRF state token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use urlencoding::encode;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway_db::{now_ms, GatewayDb, OAuthClientRegistration};
use crate::hosts::host_from_url;
use crate::metrics::GatewayMetrics;
use crate::outbound::{OutboundClient, OutboundFailure};
use crate::resolver::Resolver;

/// Clock skew tolerated on a returned state timestamp.
const STATE_FUTURE_SKEW_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub username: String,
    /// Lowercased; may carry a port.
    pub domain: String,
}

impl Handle {
    pub fn acct(&self) -> String {
        format!("{}@{}", self.username, self.domain)
    }
}

/// `[@]username@domain[:port]`. The username may not carry whitespace or URL
/// delimiters; the domain is limited to hostname characters.
pub fn parse_handle(input: &str) -> GatewayResult<Handle> {
    let invalid = || GatewayError::InvalidHandle(input.to_string());
    let raw = input.trim();
    let raw = raw.strip_prefix('@').unwrap_or(raw);
    let (username, domain) = raw.split_once('@').ok_or_else(invalid)?;
    let bad_user = username.is_empty()
        || username
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '@' | '/' | '?' | '#' | ':'));
    if bad_user || !is_domain(domain) {
        return Err(invalid());
    }
    Ok(Handle {
        username: username.to_string(),
        domain: domain.to_ascii_lowercase(),
    })
}

fn is_domain(domain: &str) -> bool {
    let (host, port) = match domain.split_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (domain, None),
    };
    let host_ok = !host.is_empty()
        && !host.starts_with(['.', '-'])
        && !host.ends_with('-')
        && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let port_ok = match port {
        None => true,
        Some(p) => !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) && p.parse::<u16>().is_ok(),
    };
    host_ok && port_ok
}

/// Equality of two secrets by SHA-256 digest, without an early exit.
pub(crate) fn secrets_match(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Contents of the `state` parameter. Self-describing but not trusted on its
/// own: see [`verify_state`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FederationState {
    pub domain: String,
    pub username: String,
    #[serde(rename = "identityUrl", default, skip_serializing_if = "Option::is_none")]
    pub identity_url: Option<String>,
    /// Issue time, unix milliseconds.
    pub ts: i64,
    pub nonce: String,
}

impl FederationState {
    pub fn new(handle: &Handle, identity_url: Option<String>, ts: i64) -> Self {
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        Self {
            domain: handle.domain.clone(),
            username: handle.username.clone(),
            identity_url,
            ts,
            nonce: hex::encode(nonce),
        }
    }

    pub fn encode(&self) -> GatewayResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| GatewayError::storage(e.into()))?;
        Ok(B64URL.encode(json))
    }

    pub fn decode(token: &str) -> GatewayResult<Self> {
        let bad = || GatewayError::InvalidInput("malformed state".to_string());
        let bytes = B64URL.decode(token.trim()).map_err(|_| bad())?;
        serde_json::from_slice(&bytes).map_err(|_| bad())
    }
}

/// Accepts `returned` only if it is the token this instance issued (compared
/// by digest, in constant time) and is younger than `max_age`.
pub fn verify_state(issued: &str, returned: &str, max_age: Duration) -> GatewayResult<FederationState> {
    verify_state_at(issued, returned, max_age, now_ms())
}

pub fn verify_state_at(
    issued: &str,
    returned: &str,
    max_age: Duration,
    now_ms: i64,
) -> GatewayResult<FederationState> {
    if !secrets_match(issued, returned) {
        return Err(GatewayError::InvalidInput("state mismatch".to_string()));
    }
    let state = FederationState::decode(returned)?;
    let age = now_ms.saturating_sub(state.ts);
    if age > max_age.as_millis() as i64 || age < -STATE_FUTURE_SKEW_MS {
        return Err(GatewayError::InvalidInput("state expired".to_string()));
    }
    Ok(state)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FederatedLogin {
    #[serde(rename = "authorizationUrl")]
    pub authorization_url: String,
    pub state: String,
    #[serde(rename = "identityUrl", skip_serializing_if = "Option::is_none")]
    pub identity_url: Option<String>,
}

#[derive(serde::Deserialize)]
struct AppRegistration {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Clone)]
pub struct FederatedAuth {
    db: GatewayDb,
    resolver: Resolver,
    outbound: OutboundClient,
    metrics: Arc<GatewayMetrics>,
    instance_name: String,
    instance_website: Option<String>,
    scopes: String,
    remote_scheme: String,
    state_max_age: Duration,
}

impl FederatedAuth {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: GatewayDb,
        resolver: Resolver,
        outbound: OutboundClient,
        metrics: Arc<GatewayMetrics>,
        instance_name: String,
        instance_website: Option<String>,
        scopes: String,
        remote_scheme: String,
        state_max_age: Duration,
    ) -> Self {
        Self {
            db,
            resolver,
            outbound,
            metrics,
            instance_name,
            instance_website,
            scopes,
            remote_scheme,
            state_max_age,
        }
    }

    /// [`verify_state`] with the configured maximum age.
    pub fn verify_state(&self, issued: &str, returned: &str) -> GatewayResult<FederationState> {
        verify_state(issued, returned, self.state_max_age)
    }

    pub async fn begin_federated_login(&self, handle: &str, redirect_uri: &str) -> GatewayResult<FederatedLogin> {
        let handle = parse_handle(handle)?;
        let redirect_uri = redirect_uri.trim();
        if host_from_url(redirect_uri).is_none() {
            return Err(GatewayError::InvalidInput(format!("redirect uri {redirect_uri:?}")));
        }

        let jrd = self.resolver.discover(&handle).await?;
        let identity_url = jrd.self_link().map(str::to_string);

        let client = self.client_for(&handle.domain, redirect_uri).await?;
        if client.redirect_uri != redirect_uri {
            return Err(GatewayError::InvalidInput(format!(
                "redirect uri {redirect_uri:?} is not the one registered with {}",
                handle.domain
            )));
        }
        let state = FederationState::new(&handle, identity_url.clone(), now_ms()).encode()?;
        let authorization_url = format!(
            "{}://{}/oauth/authorize?client_id={}&scope={}&redirect_uri={}&response_type=code&state={}",
            self.remote_scheme,
            handle.domain,
            encode(&client.client_id),
            encode(&client.scopes),
            encode(&client.redirect_uri),
            encode(&state),
        );
        info!(domain = %handle.domain, "federated login started");
        Ok(FederatedLogin {
            authorization_url,
            state,
            identity_url,
        })
    }

    /// Stored registration for `domain`, registering this instance first if none exists.
    pub async fn client_for(&self, domain: &str, redirect_uri: &str) -> GatewayResult<OAuthClientRegistration> {
        let d = domain.to_string();
        if let Some(existing) = self.db.call(move |db| db.get_oauth_client(&d)).await? {
            return Ok(existing);
        }

        let url = format!("{}://{}/api/v1/apps", self.remote_scheme, domain);
        let mut body = serde_json::json!({
            "client_name": self.instance_name,
            "redirect_uris": redirect_uri,
            "scopes": self.scopes,
        });
        if let Some(site) = &self.instance_website {
            body["website"] = serde_json::Value::String(site.clone());
        }
        let app: AppRegistration = self
            .outbound
            .post_json(&url, &body)
            .await
            .map_err(|e| registration_error(domain, e))?;
        let (Some(client_id), Some(client_secret)) = (
            app.client_id.filter(|s| !s.is_empty()),
            app.client_secret.filter(|s| !s.is_empty()),
        ) else {
            return Err(GatewayError::UnsupportedPeer {
                domain: domain.to_string(),
                detail: "client registration (no credentials returned)".to_string(),
            });
        };

        let reg = OAuthClientRegistration {
            instance_domain: domain.to_string(),
            client_id,
            client_secret,
            redirect_uri: redirect_uri.to_string(),
            scopes: self.scopes.clone(),
            created_at_ms: now_ms(),
        };
        let (live, created) = self.db.call(move |db| db.insert_oauth_client_if_absent(&reg)).await?;
        if created {
            self.metrics.registration_created();
            info!(domain, "registered as oauth client");
        } else {
            info!(domain, "concurrent registration lost; reusing stored client");
        }
        Ok(live)
    }
}

fn registration_error(domain: &str, e: OutboundFailure) -> GatewayError {
    match e {
        OutboundFailure::Status(404 | 405 | 501) | OutboundFailure::Body(_) => GatewayError::UnsupportedPeer {
            domain: domain.to_string(),
            detail: "client registration".to_string(),
        },
        OutboundFailure::Status(s) if (400..500).contains(&s) => GatewayError::UnsupportedPeer {
            domain: domain.to_string(),
            detail: format!("client registration (http status {s})"),
        },
        OutboundFailure::InvalidUrl => GatewayError::InvalidHandle(domain.to_string()),
        other => GatewayError::Unreachable {
            host: domain.to_string(),
            detail: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_grammar() {
        let h = parse_handle("@Alice@Social.Example").unwrap();
        assert_eq!(h.username, "Alice");
        assert_eq!(h.domain, "social.example");
        assert_eq!(h.acct(), "Alice@social.example");
        assert_eq!(parse_handle(" bob@127.0.0.1:8080 ").unwrap().domain, "127.0.0.1:8080");

        for bad in [
            "not-a-handle",
            "@",
            "a@",
            "@b",
            "a@b@c",
            "a b@c",
            "a@b/c",
            "",
            "alice@host?x",
            "alice@host#frag",
            "alice@host:",
            "alice@host:http",
            "alice@host:1:2",
            "alice@host:99999",
            "alice@:443",
            "al:ice@host",
        ] {
            assert!(matches!(parse_handle(bad), Err(GatewayError::InvalidHandle(_))), "{bad}");
        }
    }

    #[test]
    fn state_is_only_accepted_when_it_matches_what_was_issued() {
        let handle = parse_handle("alice@r.example").unwrap();
        let issued = FederationState::new(&handle, Some("https://r.example/users/alice".into()), 1_000)
            .encode()
            .unwrap();
        let max_age = Duration::from_secs(600);

        let state = verify_state_at(&issued, &issued, max_age, 2_000).unwrap();
        assert_eq!(state.domain, "r.example");
        assert_eq!(state.nonce.len(), 32);

        // A well-formed token minted elsewhere is still rejected.
        let forged = FederationState::new(&handle, None, 1_000).encode().unwrap();
        assert!(verify_state_at(&issued, &forged, max_age, 2_000).is_err());

        let late = 1_000 + 601_000;
        assert!(verify_state_at(&issued, &issued, max_age, late).is_err());
    }

    #[test]
    fn registration_failures_map_to_taxonomy() {
        assert!(matches!(
            registration_error("r.example", OutboundFailure::Status(404)),
            GatewayError::UnsupportedPeer { .. }
        ));
        assert!(matches!(
            registration_error("r.example", OutboundFailure::Timeout),
            GatewayError::Unreachable { .. }
        ));
        assert!(matches!(
            registration_error("r.example", OutboundFailure::Status(503)),
            GatewayError::Unreachable { .. }
        ));
    }
}

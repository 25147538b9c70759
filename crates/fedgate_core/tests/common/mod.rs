/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fedgate_core::config::GatewayConfig;
use fedgate_core::gateway_db::{GatewayDb, LocalActor, Role};
use fedgate_core::Gateway;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const MODERATOR: &str = "https://local.example/users/mod";

#[derive(Default)]
pub struct Hits {
    pub actor: AtomicUsize,
    pub webfinger: AtomicUsize,
    pub apps: AtomicUsize,
}

impl Hits {
    pub fn total(&self) -> usize {
        self.actor.load(Ordering::SeqCst) + self.webfinger.load(Ordering::SeqCst) + self.apps.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AppsMode {
    Register,
    Missing,
}

#[derive(Clone)]
struct RemoteState {
    domain: String,
    hits: Arc<Hits>,
    apps: AppsMode,
}

/// A fake remote server on an ephemeral port. Its domain is `127.0.0.1:<port>`.
pub struct MockRemote {
    pub domain: String,
    pub hits: Arc<Hits>,
}

impl MockRemote {
    pub fn actor_url(&self, name: &str) -> String {
        format!("http://{}/users/{name}", self.domain)
    }
}

pub async fn spawn_remote(apps: AppsMode) -> MockRemote {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let domain = listener.local_addr().unwrap().to_string();
    let hits = Arc::new(Hits::default());
    let state = RemoteState {
        domain: domain.clone(),
        hits: hits.clone(),
        apps,
    };
    let app = Router::new()
        .route("/users/:name", get(remote_actor))
        .route("/.well-known/webfinger", get(remote_webfinger))
        .route("/api/v1/apps", post(remote_apps))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockRemote { domain, hits }
}

async fn remote_actor(State(st): State<RemoteState>, Path(name): Path<String>) -> Response {
    st.hits.actor.fetch_add(1, Ordering::SeqCst);
    let id = match name.as_str() {
        "broken" => return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "garbage" => return (StatusCode::OK, "<html>not json</html>").into_response(),
        "huge" => return (StatusCode::OK, "x".repeat(2 * 1024 * 1024)).into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            format!("http://{}/users/slow", st.domain)
        }
        "liar" => "https://elsewhere.example/users/liar".to_string(),
        _ => format!("http://{}/users/{name}", st.domain),
    };
    Json(json!({
        "@context": ["https://www.w3.org/ns/activitystreams"],
        "id": id,
        "type": "Person",
        "preferredUsername": name,
        "name": format!("Remote {name}"),
        "inbox": format!("{id}/inbox"),
        "outbox": format!("{id}/outbox"),
        "publicKey": {"id": format!("{id}#main-key"), "owner": id, "publicKeyPem": "PEM"}
    }))
    .into_response()
}

async fn remote_webfinger(State(st): State<RemoteState>, Query(q): Query<HashMap<String, String>>) -> Response {
    st.hits.webfinger.fetch_add(1, Ordering::SeqCst);
    let resource = q.get("resource").cloned().unwrap_or_default();
    let Some(acct) = resource.strip_prefix("acct:") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let user = acct.split('@').next().unwrap_or_default().to_string();
    if user == "nobody" || !acct.ends_with(&st.domain) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let href = format!("http://{}/users/{user}", st.domain);
    Json(json!({
        "subject": resource,
        "links": [
            {"rel": "http://webfinger.net/rel/profile-page", "type": "text/html", "href": href},
            {"rel": "self", "type": "application/activity+json", "href": href}
        ]
    }))
    .into_response()
}

async fn remote_apps(State(st): State<RemoteState>, Json(body): Json<serde_json::Value>) -> Response {
    let n = st.hits.apps.fetch_add(1, Ordering::SeqCst) + 1;
    if st.apps == AppsMode::Missing {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "id": n.to_string(),
        "name": body["client_name"],
        "redirect_uri": body["redirect_uris"],
        "client_id": format!("cid-{n}"),
        "client_secret": format!("secret-{n}")
    }))
    .into_response()
}

/// A `host:port` nothing listens on.
pub async fn dead_domain() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

pub fn gateway(dir: &TempDir, extra: serde_json::Value) -> Gateway {
    let mut cfg = json!({
        "public_base_url": "https://local.example",
        "domain": "local.example",
        "instance_name": "fedgate-test",
        "data_dir": dir.path().to_string_lossy(),
        "remote_scheme": "http",
        "http_timeout_secs": 1,
        "http_attempts": 1,
        "use_env_proxy": false,
    });
    if let (Some(base), Some(more)) = (cfg.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            base.insert(k.clone(), v.clone());
        }
    }
    let cfg = GatewayConfig::from_json(&cfg.to_string()).unwrap();
    let gw = Gateway::open(cfg).unwrap();
    gw.db.grant_role(MODERATOR, Role::Moderator).unwrap();
    gw
}

pub fn local_actor(db: &GatewayDb, username: &str, enabled: bool) {
    db.upsert_local_actor(&LocalActor {
        username: username.to_string(),
        display_name: Some(format!("Local {username}")),
        summary: None,
        public_key_pem: "-----BEGIN PUBLIC KEY-----\nMIIB\n-----END PUBLIC KEY-----\n".to_string(),
        icon_url: None,
        icon_media_type: None,
        federation_enabled: enabled,
        created_at_ms: 1_700_000_000_000,
    })
    .unwrap();
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{gateway, local_actor, spawn_remote, AppsMode, MODERATOR};
use fedgate_core::gateway_db::Relation;
use fedgate_core::http_api::router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, header::HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

const TOKEN: &str = "operator-token";

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn purge_request(token: Option<&str>, who: Option<&str>) -> Request<Body> {
    let mut b = Request::builder()
        .method(Method::DELETE)
        .uri("/_gateway/hosts/spam.example/requests");
    if let Some(t) = token {
        b = b.header("x-gateway-token", t);
    }
    if let Some(w) = who {
        b = b.header("x-gateway-actor", w);
    }
    b.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn actor_document_is_federation_json_with_cors() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({}));
    local_actor(&gw.db, "alice", true);
    let app = router(gw);

    let req = Request::builder()
        .uri("/users/alice")
        .header(header::ACCEPT, "application/activity+json")
        .header(header::ORIGIN, "https://other.example")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/activity+json"));
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(body["id"], "https://local.example/users/alice");
    assert_eq!(body["name"], "Local alice");
    assert!(body.get("summary").is_none());

    let (status, _, _) = send(&app, get("/users/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_actor_is_gone() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({}));
    local_actor(&gw.db, "quiet", false);
    let app = router(gw);

    for uri in ["/users/quiet", "/users/quiet/followers"] {
        let (status, _, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::GONE, "{uri}");
        assert!(body.get("id").is_none());
    }
    let (status, _, _) = send(&app, get("/.well-known/webfinger?resource=acct:quiet@local.example")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn followers_are_paginated_over_http() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({}));
    local_actor(&gw.db, "alice", true);
    local_actor(&gw.db, "bob", true);
    for i in 0..120 {
        gw.db
            .add_relation("alice", Relation::Followers, &format!("https://r.example/u/{i:03}"))
            .unwrap();
    }
    for i in 0..10 {
        gw.db
            .add_relation("bob", Relation::Followers, &format!("https://r.example/u/{i}"))
            .unwrap();
    }
    let app = router(gw);
    let col = "https://local.example/users/alice/followers";

    let (status, _, root) = send(&app, get("/users/alice/followers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["type"], "OrderedCollection");
    assert_eq!(root["totalItems"], 120);
    assert_eq!(root["first"], format!("{col}?page=1"));
    assert!(root.get("orderedItems").is_none());

    let (_, _, page2) = send(&app, get("/users/alice/followers?page=2")).await;
    assert_eq!(page2["type"], "OrderedCollectionPage");
    assert_eq!(page2["partOf"], col);
    assert_eq!(page2["prev"], format!("{col}?page=1"));
    assert_eq!(page2["next"], format!("{col}?page=3"));
    assert_eq!(page2["orderedItems"].as_array().unwrap().len(), 50);

    let (_, _, small) = send(&app, get("/users/bob/followers")).await;
    assert_eq!(small["totalItems"], 10);
    assert_eq!(small["orderedItems"].as_array().unwrap().len(), 10);
    assert!(small.get("first").is_none());

    let (status, _, _) = send(&app, get("/users/alice/followers?page=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ledger_purge_is_moderator_only() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({"internal_token": TOKEN}));
    gw.ledger.record_attempt("spam.example", false, 10).await;
    gw.ledger.record_attempt("spam.example", true, 30).await;
    let app = router(gw);

    let (status, _, _) = send(&app, purge_request(Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _, _) = send(&app, purge_request(Some(TOKEN), Some("https://local.example/users/eve"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _, _) = send(&app, purge_request(Some("wrong-token"), Some(MODERATOR))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = Request::builder()
        .uri("/_gateway/hosts/spam.example/requests?minutes=5")
        .header("x-gateway-token", TOKEN)
        .body(Body::empty())
        .unwrap();
    let (_, _, before) = send(&app, req).await;
    assert_eq!(before["count"], 2);
    assert_eq!(before["failures"], 1);
    assert_eq!(before["medianLatencyMs"], 20);

    let (status, _, body) = send(&app, purge_request(Some(TOKEN), Some(MODERATOR))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);
}

#[tokio::test]
async fn caller_header_alone_cannot_moderate() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({}));
    gw.ledger.record_attempt("spam.example", true, 10).await;
    let db = gw.db.clone();
    let app = router(gw);

    let (status, _, _) = send(&app, purge_request(None, Some(MODERATOR))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(db.count_requests_between("spam.example", 0, i64::MAX).unwrap(), 1);

    let put = Request::builder()
        .method(Method::PUT)
        .uri("/_gateway/hosts/spam.example/reputation")
        .header("x-gateway-actor", MODERATOR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"status": "blocked"}).to_string()))
        .unwrap();
    let (status, _, _) = send(&app, put).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(db.get_host_reputation("spam.example").unwrap().is_none());

    let invalidate = Request::builder()
        .method(Method::POST)
        .uri("/_gateway/cache/invalidate")
        .header("x-gateway-actor", MODERATOR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"all": true}).to_string()))
        .unwrap();
    let (status, _, _) = send(&app, invalidate).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reputation_endpoints_round_trip() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({"internal_token": TOKEN}));
    let app = router(gw);

    let req = Request::builder()
        .uri("/_gateway/hosts/spam.example/reputation")
        .header("x-gateway-token", TOKEN)
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app, req).await;
    assert_eq!(body["status"], "normal");

    let put = Request::builder()
        .method(Method::PUT)
        .uri("/_gateway/hosts/spam.example/reputation")
        .header("x-gateway-token", TOKEN)
        .header("x-gateway-actor", MODERATOR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"status": "blocked", "reason": "spam"}).to_string()))
        .unwrap();
    let (status, _, row) = send(&app, put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["updated_by"], MODERATOR);

    let req = Request::builder()
        .uri("/_gateway/hosts/spam.example/reputation")
        .header("x-gateway-token", TOKEN)
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app, req).await;
    assert_eq!(body["status"], "blocked");
    assert_eq!(body["override"]["reason"], "spam");
}

#[tokio::test]
async fn internal_routes_require_token_when_configured() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({"internal_token": "s3cret"}));
    local_actor(&gw.db, "alice", true);
    let app = router(gw);

    let (status, _, _) = send(&app, get("/_gateway/metrics")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = Request::builder()
        .uri("/_gateway/metrics")
        .header("x-gateway-token", "s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cache"]["entries"], 0);

    // Public federation routes stay open.
    let (status, _, _) = send(&app, get("/users/alice")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn federated_login_over_http() {
    let remote = spawn_remote(AppsMode::Register).await;
    let dir = TempDir::new().unwrap();
    let gw = gateway(&dir, json!({}));
    let app = router(gw);

    let login = |handle: String| {
        Request::builder()
            .method(Method::POST)
            .uri("/_gateway/login/federated")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"handle": handle, "redirectUri": "https://local.example/cb"}).to_string(),
            ))
            .unwrap()
    };

    let (status, _, body) = send(&app, login(format!("alice@{}", remote.domain))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["authorizationUrl"].as_str().unwrap().contains("client_id=cid-1"));
    assert!(!body["state"].as_str().unwrap().is_empty());

    let (status, _, body) = send(&app, login("not-a-handle".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-handle"));
}

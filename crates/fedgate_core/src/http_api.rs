/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fedgate_protocol::{ACTIVITY_JSON, LD_JSON_ACTIVITY};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info_span, warn};

use crate::error::GatewayError;
use crate::federated_auth::secrets_match;
use crate::publisher::{PageRequest, Relation};
use crate::reputation::HostStatus;
use crate::resolver::IdentityRef;
use crate::Gateway;

const INTERNAL_TOKEN_HEADER: &str = "x-gateway-token";
const CALLER_HEADER: &str = "x-gateway-actor";

pub fn router(gw: Gateway) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    let public = Router::new()
        .route("/.well-known/webfinger", get(webfinger))
        .route("/users/:username", get(actor_get))
        .route("/users/:username/followers", get(followers_get))
        .route("/users/:username/following", get(following_get))
        .layer(cors);

    let internal = Router::new()
        .route("/_gateway/login/federated", post(federated_login))
        .route("/_gateway/resolve", get(resolve_get))
        .route("/_gateway/hosts/hot", get(hot_hosts_get))
        .route(
            "/_gateway/hosts/:host/requests",
            get(host_requests_get).delete(host_requests_purge),
        )
        .route(
            "/_gateway/hosts/:host/reputation",
            get(reputation_get).put(reputation_put).delete(reputation_delete),
        )
        .route("/_gateway/reputation", get(reputation_list))
        .route("/_gateway/cache/invalidate", post(cache_invalidate))
        .route("/_gateway/cache/refresh", post(cache_refresh))
        .route("/_gateway/metrics", get(metrics_get))
        .route_layer(from_fn_with_state(gw.clone(), require_internal));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(public)
        .merge(internal)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("req");
                info_span!(
                    "http",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(from_fn(ensure_request_id))
        .with_state(gw)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UnsupportedPeer { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidHandle(_) | GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::Gone(_) => StatusCode::GONE,
            GatewayError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult = Result<Response, GatewayError>;

#[derive(Clone, Copy)]
enum ActivityAccept {
    ActivityJson,
    LdJson,
}

fn accept_activity(headers: &HeaderMap) -> ActivityAccept {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if accept.contains("application/ld+json") {
        ActivityAccept::LdJson
    } else {
        ActivityAccept::ActivityJson
    }
}

fn json_activity<T: Serialize>(accept: ActivityAccept, value: &T) -> Response {
    let body = serde_json::to_vec(value).unwrap_or_default();
    let ct = match accept {
        ActivityAccept::ActivityJson => format!("{ACTIVITY_JSON}; charset=utf-8"),
        ActivityAccept::LdJson => format!("{LD_JSON_ACTIVITY}; charset=utf-8"),
    };
    let mut resp = Response::new(Body::from(body));
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&ct) {
        headers.insert(header::CONTENT_TYPE, v);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
    resp
}

fn jrd<T: Serialize>(value: &T) -> Response {
    let body = serde_json::to_vec(value).unwrap_or_default();
    let mut resp = Response::new(Body::from(body));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/jrd+json; charset=utf-8"),
    );
    resp
}

/// The caller named in `x-gateway-actor`. The header is only believed behind a
/// configured internal token; without one every caller is anonymous.
fn caller<'a>(gw: &Gateway, headers: &'a HeaderMap) -> Option<&'a str> {
    let named = headers.get(CALLER_HEADER).and_then(|v| v.to_str().ok())?;
    if gw.cfg.internal_token.is_none() {
        warn!(caller = named, "ignoring caller header: no internal token configured");
        return None;
    }
    Some(named)
}

async fn ensure_request_id(mut req: Request, next: Next) -> Response {
    if req.headers().get("x-request-id").is_none() {
        let mut b = [0u8; 8];
        OsRng.fill_bytes(&mut b);
        if let Ok(v) = HeaderValue::from_str(&hex::encode(b)) {
            req.headers_mut().insert("x-request-id", v);
        }
    }
    next.run(req).await
}

async fn require_internal(State(gw): State<Gateway>, req: Request, next: Next) -> Response {
    if let Some(expected) = gw.cfg.internal_token.as_deref() {
        let token = req
            .headers()
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !secrets_match(token, expected) {
            warn!(uri = %req.uri(), "internal endpoint called without valid token");
            return (StatusCode::FORBIDDEN, "forbidden").into_response();
        }
    }
    next.run(req).await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(gw): State<Gateway>) -> Response {
    match gw.db.call(|db| db.health_check()).await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            warn!("readiness check failed: {e:#}");
            (StatusCode::SERVICE_UNAVAILABLE, "db unavailable").into_response()
        }
    }
}

// Public federation endpoints.

#[derive(Deserialize)]
struct WebfingerQuery {
    resource: Option<String>,
}

async fn webfinger(State(gw): State<Gateway>, Query(q): Query<WebfingerQuery>) -> ApiResult {
    let resource = q
        .resource
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| GatewayError::InvalidInput("missing resource".to_string()))?;
    Ok(jrd(&gw.publisher.webfinger(&resource).await?))
}

async fn actor_get(State(gw): State<Gateway>, Path(username): Path<String>, headers: HeaderMap) -> ApiResult {
    let doc = gw.publisher.render_identity(&username).await?;
    Ok(json_activity(accept_activity(&headers), &doc))
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<String>,
}

async fn followers_get(
    State(gw): State<Gateway>,
    Path(username): Path<String>,
    Query(q): Query<PageQuery>,
    headers: HeaderMap,
) -> ApiResult {
    relationship(&gw, &username, Relation::Followers, q, &headers).await
}

async fn following_get(
    State(gw): State<Gateway>,
    Path(username): Path<String>,
    Query(q): Query<PageQuery>,
    headers: HeaderMap,
) -> ApiResult {
    relationship(&gw, &username, Relation::Following, q, &headers).await
}

async fn relationship(gw: &Gateway, username: &str, relation: Relation, q: PageQuery, headers: &HeaderMap) -> ApiResult {
    let page = PageRequest::from_query(q.page.as_deref())?;
    let doc = gw.publisher.render_relationship_page(username, relation, page).await?;
    Ok(json_activity(accept_activity(headers), &doc))
}

// Internal endpoints.

#[derive(Deserialize)]
struct FederatedLoginReq {
    handle: String,
    #[serde(rename = "redirectUri", alias = "redirect_uri")]
    redirect_uri: String,
}

async fn federated_login(State(gw): State<Gateway>, Json(req): Json<FederatedLoginReq>) -> ApiResult {
    let login = gw.auth.begin_federated_login(&req.handle, &req.redirect_uri).await?;
    Ok(Json(login).into_response())
}

#[derive(Deserialize)]
struct ResolveQuery {
    #[serde(rename = "ref")]
    reference: String,
}

async fn resolve_get(State(gw): State<Gateway>, Query(q): Query<ResolveQuery>) -> ApiResult {
    let reference = q.reference.trim();
    let res = if reference.contains('@') && !reference.contains("://") && !reference.starts_with('{') {
        gw.resolver.resolve_handle(reference).await?
    } else {
        gw.resolver.resolve_detailed(IdentityRef::parse(reference)).await?
    };
    Ok(Json(serde_json::json!({
        "source": res.source,
        "document": res.document,
    }))
    .into_response())
}

#[derive(Deserialize)]
struct HotQuery {
    threshold: Option<u64>,
    minutes: Option<u64>,
}

async fn hot_hosts_get(State(gw): State<Gateway>, Query(q): Query<HotQuery>) -> ApiResult {
    let threshold = q.threshold.unwrap_or(100);
    let window = window_minutes(q.minutes);
    let hosts = gw.ledger.list_hot_hosts(threshold, window).await?;
    Ok(Json(serde_json::json!({ "threshold": threshold, "hosts": hosts })).into_response())
}

#[derive(Deserialize)]
struct WindowQuery {
    minutes: Option<u64>,
}

async fn host_requests_get(
    State(gw): State<Gateway>,
    Path(host): Path<String>,
    Query(q): Query<WindowQuery>,
) -> ApiResult {
    let window = window_minutes(q.minutes);
    let counted = gw.ledger.count_in_window(&host, window).await?;
    let stats = gw.ledger.host_stats(&host, window).await?;
    Ok(Json(serde_json::json!({
        "host": stats.host,
        "count": counted.count,
        "failures": stats.failures,
        "medianLatencyMs": stats.median_latency_ms,
        "entries": counted.entries,
    }))
    .into_response())
}

async fn host_requests_purge(State(gw): State<Gateway>, Path(host): Path<String>, headers: HeaderMap) -> ApiResult {
    let removed = gw.ledger.purge(&host, caller(&gw, &headers)).await?;
    Ok(Json(serde_json::json!({ "removed": removed })).into_response())
}

async fn reputation_get(State(gw): State<Gateway>, Path(host): Path<String>) -> ApiResult {
    let row = gw.reputation.lookup(&host).await?;
    let status = row.as_ref().map(|r| r.status).unwrap_or(HostStatus::Normal);
    Ok(Json(serde_json::json!({
        "host": crate::hosts::normalize_host(&host),
        "status": status,
        "override": row,
    }))
    .into_response())
}

#[derive(Deserialize)]
struct ReputationReq {
    status: String,
    #[serde(default)]
    reason: String,
}

async fn reputation_put(
    State(gw): State<Gateway>,
    Path(host): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReputationReq>,
) -> ApiResult {
    let status = HostStatus::parse(&req.status)
        .ok_or_else(|| GatewayError::InvalidInput(format!("status {:?}", req.status)))?;
    let row = gw
        .reputation
        .set_status(&host, status, &req.reason, caller(&gw, &headers))
        .await?;
    Ok(Json(row).into_response())
}

async fn reputation_delete(State(gw): State<Gateway>, Path(host): Path<String>, headers: HeaderMap) -> ApiResult {
    let removed = gw.reputation.remove(&host, caller(&gw, &headers)).await?;
    Ok(Json(serde_json::json!({ "removed": removed })).into_response())
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

async fn reputation_list(State(gw): State<Gateway>, Query(q): Query<LimitQuery>) -> ApiResult {
    let rows = gw.reputation.list(q.limit.unwrap_or(200)).await?;
    Ok(Json(rows).into_response())
}

#[derive(Deserialize)]
struct InvalidateReq {
    url: Option<String>,
    #[serde(default)]
    all: bool,
}

async fn cache_invalidate(
    State(gw): State<Gateway>,
    headers: HeaderMap,
    Json(req): Json<InvalidateReq>,
) -> ApiResult {
    crate::roles::require_moderator(gw.roles.as_ref(), caller(&gw, &headers)).await?;
    if req.all {
        let removed = gw.cache.clear().await?;
        return Ok(Json(serde_json::json!({ "removed": removed })).into_response());
    }
    let url = req
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| GatewayError::InvalidInput("url or all required".to_string()))?;
    let removed = gw.cache.invalidate(url.trim()).await?;
    Ok(Json(serde_json::json!({ "removed": if removed { 1 } else { 0 } })).into_response())
}

async fn cache_refresh(State(gw): State<Gateway>, Query(q): Query<LimitQuery>) -> ApiResult {
    let report = gw.resolver.refresh_stale(q.limit.unwrap_or(100)).await?;
    Ok(Json(report).into_response())
}

async fn metrics_get(State(gw): State<Gateway>) -> ApiResult {
    let mut snap = gw.metrics.snapshot_json();
    snap["cache"]["entries"] = serde_json::json!(gw.cache.len().await?);
    Ok(Json(snap).into_response())
}

fn window_minutes(minutes: Option<u64>) -> Duration {
    Duration::from_secs(minutes.unwrap_or(10).clamp(1, 7 * 24 * 60) * 60)
}

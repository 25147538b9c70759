/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use async_trait::async_trait;
use fedgate_protocol::{
    Icon, IdentityDocument, OrderedCollection, OrderedCollectionPage, PublicKey, RelationshipDocument,
    Webfinger, WebfingerLink, ACTIVITY_JSON, AS_CONTEXT, SECURITY_CONTEXT,
};
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway_db::GatewayDb;
pub use crate::gateway_db::{LocalActor, Relation};

/// Where the publisher reads this instance's own accounts from.
#[async_trait]
pub trait LocalActorStore: Send + Sync {
    async fn local_actor(&self, username: &str) -> Result<Option<LocalActor>>;
    async fn relation_count(&self, username: &str, relation: Relation) -> Result<u64>;
    async fn relation_items(&self, username: &str, relation: Relation, offset: u64, limit: u32) -> Result<Vec<String>>;
}

#[async_trait]
impl LocalActorStore for GatewayDb {
    async fn local_actor(&self, username: &str) -> Result<Option<LocalActor>> {
        let username = username.to_string();
        self.call(move |db| db.get_local_actor(&username)).await
    }

    async fn relation_count(&self, username: &str, relation: Relation) -> Result<u64> {
        let username = username.to_string();
        self.call(move |db| db.count_relation(&username, relation)).await
    }

    async fn relation_items(&self, username: &str, relation: Relation, offset: u64, limit: u32) -> Result<Vec<String>> {
        let username = username.to_string();
        self.call(move |db| db.list_relation(&username, relation, offset, limit)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Root,
    /// 1-based.
    Page(u32),
}

impl PageRequest {
    /// `?page=` value: absent is the root collection, `true` is page 1.
    pub fn from_query(page: Option<&str>) -> GatewayResult<Self> {
        let Some(raw) = page.map(str::trim) else {
            return Ok(PageRequest::Root);
        };
        if raw.eq_ignore_ascii_case("true") {
            return Ok(PageRequest::Page(1));
        }
        match raw.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(PageRequest::Page(n)),
            _ => Err(GatewayError::InvalidInput(format!("page {raw:?}"))),
        }
    }
}

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn LocalActorStore>,
    base_url: String,
    domain: String,
    page_size: u32,
}

impl Publisher {
    pub fn new(store: Arc<dyn LocalActorStore>, base_url: &str, domain: &str, page_size: u32) -> Self {
        Self {
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
            domain: domain.to_ascii_lowercase(),
            page_size: page_size.max(1),
        }
    }

    pub fn actor_url(&self, username: &str) -> String {
        format!("{}/users/{}", self.base_url, username)
    }

    /// The actor must exist and have federation enabled.
    async fn federated_actor(&self, username: &str) -> GatewayResult<LocalActor> {
        let actor = self
            .store
            .local_actor(username)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("user {username}")))?;
        if !actor.federation_enabled {
            return Err(GatewayError::Gone(format!("user {username}")));
        }
        Ok(actor)
    }

    pub async fn render_identity(&self, username: &str) -> GatewayResult<IdentityDocument> {
        let actor = self.federated_actor(username).await?;
        Ok(self.identity_of(&actor))
    }

    fn identity_of(&self, actor: &LocalActor) -> IdentityDocument {
        let id = self.actor_url(&actor.username);
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        IdentityDocument {
            context: Some(serde_json::json!([AS_CONTEXT, SECURITY_CONTEXT])),
            id: Some(id.clone()),
            ty: Some("Person".to_string()),
            preferred_username: Some(actor.username.clone()),
            name: non_empty(&actor.display_name).or_else(|| Some(actor.username.clone())),
            summary: non_empty(&actor.summary),
            url: Some(id.clone()),
            published: ms_to_rfc3339(actor.created_at_ms),
            inbox: Some(format!("{id}/inbox")),
            outbox: Some(format!("{id}/outbox")),
            followers: Some(format!("{id}/followers")),
            following: Some(format!("{id}/following")),
            public_key: Some(PublicKey {
                id: format!("{id}#main-key"),
                owner: id.clone(),
                public_key_pem: actor.public_key_pem.clone(),
            }),
            icon: non_empty(&actor.icon_url).map(|url| Icon {
                ty: "Image".to_string(),
                media_type: non_empty(&actor.icon_media_type),
                url,
            }),
        }
    }

    pub async fn render_relationship_page(
        &self,
        username: &str,
        relation: Relation,
        page: PageRequest,
    ) -> GatewayResult<RelationshipDocument> {
        let actor = self.federated_actor(username).await?;
        let col = format!("{}/{}", self.actor_url(&actor.username), relation.as_str());
        let size = self.page_size;

        let n = match page {
            PageRequest::Root => {
                let total = self.store.relation_count(&actor.username, relation).await?;
                let (first, ordered_items) = if total <= size as u64 {
                    let items = self.store.relation_items(&actor.username, relation, 0, size).await?;
                    (None, Some(items))
                } else {
                    (Some(format!("{col}?page=1")), None)
                };
                return Ok(RelationshipDocument::Collection(OrderedCollection {
                    context: AS_CONTEXT.to_string(),
                    id: col,
                    ty: "OrderedCollection".to_string(),
                    total_items: total,
                    first,
                    ordered_items,
                }));
            }
            PageRequest::Page(n) => n.max(1),
        };

        let offset = (n as u64 - 1) * size as u64;
        let items = self.store.relation_items(&actor.username, relation, offset, size).await?;
        let prev = (n > 1).then(|| format!("{col}?page={}", n - 1));
        // A full page is assumed to have a successor; no extra count query.
        let next = (items.len() as u32 == size).then(|| format!("{col}?page={}", n + 1));
        Ok(RelationshipDocument::Page(OrderedCollectionPage {
            context: AS_CONTEXT.to_string(),
            id: format!("{col}?page={n}"),
            ty: "OrderedCollectionPage".to_string(),
            part_of: col,
            ordered_items: items,
            prev,
            next,
        }))
    }

    /// Answers `acct:user@domain` or an actor URL of this instance.
    /// Disabled accounts are reported as unknown.
    pub async fn webfinger(&self, resource: &str) -> GatewayResult<Webfinger> {
        let not_found = || GatewayError::NotFound(format!("resource {resource}"));
        let resource = resource.trim();
        let username = if let Some(acct) = resource.strip_prefix("acct:") {
            let acct = acct.strip_prefix('@').unwrap_or(acct);
            let (user, domain) = acct.split_once('@').ok_or_else(not_found)?;
            if !domain.eq_ignore_ascii_case(&self.domain) {
                return Err(not_found());
            }
            user.to_string()
        } else {
            let prefix = format!("{}/users/", self.base_url);
            resource
                .strip_prefix(&prefix)
                .filter(|u| !u.is_empty() && !u.contains('/'))
                .ok_or_else(not_found)?
                .to_string()
        };

        let actor = match self.federated_actor(&username).await {
            Ok(a) => a,
            Err(GatewayError::Gone(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        let href = self.actor_url(&actor.username);
        Ok(Webfinger {
            subject: format!("acct:{}@{}", actor.username, self.domain),
            aliases: vec![href.clone()],
            links: vec![
                WebfingerLink {
                    rel: "self".to_string(),
                    ty: Some(ACTIVITY_JSON.to_string()),
                    href: Some(href.clone()),
                    template: None,
                },
                WebfingerLink {
                    rel: "http://webfinger.net/rel/profile-page".to_string(),
                    ty: Some("text/html".to_string()),
                    href: Some(href),
                    template: None,
                },
            ],
        })
    }
}

fn ms_to_rfc3339(ms: i64) -> Option<String> {
    if ms <= 0 {
        return None;
    }
    let dt = time::OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()?;
    dt.format(&time::format_description::well_known::Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn actor(username: &str, enabled: bool) -> LocalActor {
        LocalActor {
            username: username.to_string(),
            display_name: None,
            summary: Some("  ".to_string()),
            public_key_pem: "-----BEGIN PUBLIC KEY-----\nMIIB\n-----END PUBLIC KEY-----\n".to_string(),
            icon_url: None,
            icon_media_type: None,
            federation_enabled: enabled,
            created_at_ms: 1_700_000_000_000,
        }
    }

    fn setup() -> (TempDir, GatewayDb, Publisher) {
        let dir = TempDir::new().unwrap();
        let db = GatewayDb::open(dir.path().join("pub.db")).unwrap();
        let publisher = Publisher::new(Arc::new(db.clone()), "https://local.example/", "Local.Example", 50);
        (dir, db, publisher)
    }

    fn has_null(v: &serde_json::Value) -> bool {
        match v {
            serde_json::Value::Null => true,
            serde_json::Value::Array(a) => a.iter().any(has_null),
            serde_json::Value::Object(m) => m.values().any(has_null),
            _ => false,
        }
    }

    #[tokio::test]
    async fn identity_omits_absent_fields() {
        let (_dir, db, publisher) = setup();
        db.upsert_local_actor(&actor("alice", true)).unwrap();

        let doc = publisher.render_identity("alice").await.unwrap();
        let v = serde_json::to_value(&doc).unwrap();
        assert!(!has_null(&v));
        assert!(v.get("summary").is_none());
        assert!(v.get("icon").is_none());
        assert_eq!(v["id"], "https://local.example/users/alice");
        assert_eq!(v["name"], "alice");
        assert_eq!(v["publicKey"]["id"], "https://local.example/users/alice#main-key");
        assert_eq!(v["published"], "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn unknown_and_disabled_actors_fail() {
        let (_dir, db, publisher) = setup();
        db.upsert_local_actor(&actor("hidden", false)).unwrap();
        assert!(matches!(publisher.render_identity("ghost").await, Err(GatewayError::NotFound(_))));
        assert!(matches!(publisher.render_identity("hidden").await, Err(GatewayError::Gone(_))));
        assert!(matches!(
            publisher
                .render_relationship_page("hidden", Relation::Followers, PageRequest::Root)
                .await,
            Err(GatewayError::Gone(_))
        ));
        assert!(matches!(
            publisher.webfinger("acct:hidden@local.example").await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn large_relation_is_paginated() {
        let (_dir, db, publisher) = setup();
        db.upsert_local_actor(&actor("alice", true)).unwrap();
        for i in 0..120 {
            db.add_relation("alice", Relation::Followers, &format!("https://r.example/u/{i:03}"))
                .unwrap();
        }
        let col = "https://local.example/users/alice/followers";

        let RelationshipDocument::Collection(root) = publisher
            .render_relationship_page("alice", Relation::Followers, PageRequest::Root)
            .await
            .unwrap()
        else {
            panic!("root should be a collection");
        };
        assert_eq!(root.total_items, 120);
        assert_eq!(root.first.as_deref(), Some(format!("{col}?page=1").as_str()));
        assert!(root.ordered_items.is_none());

        let RelationshipDocument::Page(p2) = publisher
            .render_relationship_page("alice", Relation::Followers, PageRequest::Page(2))
            .await
            .unwrap()
        else {
            panic!("page 2 should be a page");
        };
        assert_eq!(p2.part_of, col);
        assert_eq!(p2.ordered_items.len(), 50);
        assert_eq!(p2.ordered_items[0], "https://r.example/u/050");
        assert_eq!(p2.prev.as_deref(), Some(format!("{col}?page=1").as_str()));
        assert_eq!(p2.next.as_deref(), Some(format!("{col}?page=3").as_str()));

        let RelationshipDocument::Page(p3) = publisher
            .render_relationship_page("alice", Relation::Followers, PageRequest::Page(3))
            .await
            .unwrap()
        else {
            panic!("page 3 should be a page");
        };
        assert_eq!(p3.ordered_items.len(), 20);
        assert!(p3.next.is_none());
    }

    #[tokio::test]
    async fn small_relation_is_inlined() {
        let (_dir, db, publisher) = setup();
        db.upsert_local_actor(&actor("bob", true)).unwrap();
        for i in 0..10 {
            db.add_relation("bob", Relation::Following, &format!("https://r.example/u/{i}"))
                .unwrap();
        }
        let doc = publisher
            .render_relationship_page("bob", Relation::Following, PageRequest::Root)
            .await
            .unwrap();
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["totalItems"], 10);
        assert_eq!(v["orderedItems"].as_array().unwrap().len(), 10);
        assert!(v.get("first").is_none());
        assert!(v.get("next").is_none());
    }

    #[test]
    fn page_query_parsing() {
        assert_eq!(PageRequest::from_query(None).unwrap(), PageRequest::Root);
        assert_eq!(PageRequest::from_query(Some("3")).unwrap(), PageRequest::Page(3));
        assert_eq!(PageRequest::from_query(Some("true")).unwrap(), PageRequest::Page(1));
        assert!(PageRequest::from_query(Some("0")).is_err());
        assert!(PageRequest::from_query(Some("abc")).is_err());
    }

    #[tokio::test]
    async fn local_webfinger_answers_acct_and_url() {
        let (_dir, db, publisher) = setup();
        db.upsert_local_actor(&actor("alice", true)).unwrap();
        let jrd = publisher.webfinger("acct:alice@local.example").await.unwrap();
        assert_eq!(jrd.subject, "acct:alice@local.example");
        assert_eq!(jrd.self_link(), Some("https://local.example/users/alice"));
        assert!(publisher.webfinger("https://local.example/users/alice").await.is_ok());
        assert!(publisher.webfinger("acct:alice@elsewhere.example").await.is_err());
    }
}

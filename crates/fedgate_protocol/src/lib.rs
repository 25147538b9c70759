/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Wire types exchanged with remote servers: identity documents, WebFinger
//! resource descriptors and relationship collections.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACTIVITY_JSON: &str = "application/activity+json";
pub const LD_JSON_ACTIVITY: &str =
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";
/// `Accept` header sent when fetching identity documents.
pub const ACCEPT_ACTIVITY: &str =
    "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";
pub const JRD_JSON: &str = "application/jrd+json";
pub const ACCEPT_JRD: &str = "application/jrd+json, application/json";

pub const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";

/// Federation-format description of an account.
///
/// Every optional field is skipped when absent: several servers reject
/// documents carrying explicit `null`s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityDocument {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub ty: Option<String>,
    #[serde(rename = "preferredUsername", default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub inbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub outbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub followers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub following: Option<String>,
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub public_key: Option<PublicKey>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub icon: Option<Icon>,
}

impl IdentityDocument {
    /// Placeholder for an identity whose server could not be reached.
    pub fn stub(display: &str) -> Self {
        Self {
            preferred_username: Some(display.to_string()),
            name: Some(display.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicKey {
    pub id: String,
    pub owner: String,
    #[serde(rename = "publicKeyPem")]
    pub public_key_pem: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    #[serde(rename = "type", default = "image_type")]
    pub ty: String,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub url: String,
}

fn image_type() -> String {
    "Image".to_string()
}

/// WebFinger JSON resource descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Webfinger {
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub links: Vec<WebfingerLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebfingerLink {
    #[serde(default)]
    pub rel: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Webfinger {
    /// The canonical activity-document link (`rel=self`, federation content type).
    pub fn self_link(&self) -> Option<&str> {
        self.links.iter().find_map(|link| {
            if link.rel != "self" {
                return None;
            }
            let href = link.href.as_deref()?.trim();
            if href.is_empty() {
                return None;
            }
            let t = link.ty.as_deref().unwrap_or("");
            if t.is_empty() || t.contains(ACTIVITY_JSON) || t.contains("application/ld+json") {
                Some(href)
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedCollection {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(rename = "totalItems")]
    pub total_items: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(rename = "orderedItems", default, skip_serializing_if = "Option::is_none")]
    pub ordered_items: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedCollectionPage {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(rename = "partOf")]
    pub part_of: String,
    #[serde(rename = "orderedItems")]
    pub ordered_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Either the root of a followers/following collection or one of its pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelationshipDocument {
    Collection(OrderedCollection),
    Page(OrderedCollectionPage),
}

/// Accepts a string, the first string of an array, or an object's `href`.
/// Anything else becomes `None` instead of failing the whole document.
fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| string_of(&v)))
}

fn string_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Array(arr) => arr.iter().find_map(string_of),
        Value::Object(map) => map.get("href").and_then(|h| h.as_str()).map(|s| s.to_string()),
        _ => None,
    }
}

/// Like [`lenient_string`] for structured values: arrays yield their first
/// decodable element, undecodable values yield `None`.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Array(arr)) => arr
            .into_iter()
            .find_map(|item| serde_json::from_value::<T>(item).ok()),
        Some(other) => serde_json::from_value::<T>(other).ok(),
        None => None,
    })
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use fedgate_protocol::IdentityDocument;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct GatewayDb {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub identity_url: String,
    pub document: IdentityDocument,
    /// Last time the entry was written or read (cache-warming touch).
    pub fetched_at_ms: i64,
    /// Last time the document body came from the network.
    pub stored_at_ms: i64,
}

/// Outcome of writing a document into the identity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Created,
    Replaced { previous_fetched_at_ms: i64 },
    /// The stored entry is newer than the write; `fetched_at` never goes backwards.
    Ignored { newer_fetched_at_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientRegistration {
    pub instance_domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RequestLogEntry {
    pub remote_host: String,
    pub timestamp_ms: i64,
    pub success: bool,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HotHost {
    pub host: String,
    pub count: u64,
    pub latest_timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Normal,
    Probation,
    Blocked,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Normal => "normal",
            HostStatus::Probation => "probation",
            HostStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(HostStatus::Normal),
            "probation" => Some(HostStatus::Probation),
            "blocked" => Some(HostStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostReputation {
    pub host: String,
    pub status: HostStatus,
    pub reason: String,
    pub updated_by: String,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalActor {
    pub username: String,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    pub public_key_pem: String,
    pub icon_url: Option<String>,
    pub icon_media_type: Option<String>,
    pub federation_enabled: bool,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Followers,
    Following,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Followers => "followers",
            Relation::Following => "following",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Administrator => "administrator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "moderator" => Some(Role::Moderator),
            "administrator" | "admin" => Some(Role::Administrator),
            _ => None,
        }
    }
}

impl GatewayDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS identity_cache (
              identity_url TEXT PRIMARY KEY,
              document_json TEXT NOT NULL,
              fetched_at_ms INTEGER NOT NULL,
              stored_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_identity_cache_stored ON identity_cache(stored_at_ms);

            CREATE TABLE IF NOT EXISTS oauth_clients (
              instance_domain TEXT PRIMARY KEY,
              client_id TEXT NOT NULL,
              client_secret TEXT NOT NULL,
              redirect_uri TEXT NOT NULL,
              scopes TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS request_log (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              remote_host TEXT NOT NULL,
              ts_ms INTEGER NOT NULL,
              success INTEGER NOT NULL,
              latency_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_request_log_host_ts ON request_log(remote_host, ts_ms);
            CREATE INDEX IF NOT EXISTS idx_request_log_ts ON request_log(ts_ms);

            CREATE TABLE IF NOT EXISTS host_reputation (
              host TEXT PRIMARY KEY,
              status TEXT NOT NULL CHECK (status IN ('normal','probation','blocked')),
              reason TEXT NOT NULL,
              updated_by TEXT NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS local_actors (
              username TEXT PRIMARY KEY,
              display_name TEXT NULL,
              summary TEXT NULL,
              public_key_pem TEXT NOT NULL,
              icon_url TEXT NULL,
              icon_media_type TEXT NULL,
              federation_enabled INTEGER NOT NULL,
              created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS local_relations (
              username TEXT NOT NULL,
              relation TEXT NOT NULL,
              actor_id TEXT NOT NULL,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(username, relation, actor_id)
            );
            CREATE INDEX IF NOT EXISTS idx_relations_order ON local_relations(username, relation, created_at_ms);

            CREATE TABLE IF NOT EXISTS user_roles (
              actor_id TEXT NOT NULL,
              role TEXT NOT NULL,
              PRIMARY KEY(actor_id, role)
            );
            "#,
        )?;
        Ok(Self { path })
    }

    /// Runs a storage call on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&GatewayDb) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .context("storage task panicked")?
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // Identity cache.

    pub fn get_cache_entry(&self, identity_url: &str) -> Result<Option<CacheEntry>> {
        let conn = Connection::open(&self.path)?;
        let row: Option<(String, String, i64, i64)> = conn
            .query_row(
                "SELECT identity_url, document_json, fetched_at_ms, stored_at_ms FROM identity_cache WHERE identity_url=?1",
                params![identity_url],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((identity_url, json, fetched_at_ms, stored_at_ms)) = row else {
            return Ok(None);
        };
        let document: IdentityDocument = serde_json::from_str(&json)
            .with_context(|| format!("decode cached document for {identity_url}"))?;
        Ok(Some(CacheEntry {
            identity_url,
            document,
            fetched_at_ms,
            stored_at_ms,
        }))
    }

    pub fn upsert_cache_entry(
        &self,
        identity_url: &str,
        document: &IdentityDocument,
        fetched_at_ms: i64,
    ) -> Result<CacheWrite> {
        let json = serde_json::to_string(document)?;
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT fetched_at_ms FROM identity_cache WHERE identity_url=?1",
                params![identity_url],
                |r| r.get(0),
            )
            .optional()?;
        let outcome = match existing {
            Some(prev) if prev > fetched_at_ms => {
                return Ok(CacheWrite::Ignored {
                    newer_fetched_at_ms: prev,
                })
            }
            Some(prev) => CacheWrite::Replaced {
                previous_fetched_at_ms: prev,
            },
            None => CacheWrite::Created,
        };
        tx.execute(
            r#"
            INSERT INTO identity_cache(identity_url, document_json, fetched_at_ms, stored_at_ms)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(identity_url) DO UPDATE SET
              document_json=excluded.document_json,
              fetched_at_ms=excluded.fetched_at_ms,
              stored_at_ms=excluded.stored_at_ms
            "#,
            params![identity_url, json, fetched_at_ms],
        )?;
        tx.commit()?;
        Ok(outcome)
    }

    pub fn touch_cache_entry(&self, identity_url: &str, now_ms: i64) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE identity_cache SET fetched_at_ms=MAX(fetched_at_ms, ?2) WHERE identity_url=?1",
            params![identity_url, now_ms],
        )?;
        Ok(())
    }

    pub fn delete_cache_entry(&self, identity_url: &str) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let n = conn.execute("DELETE FROM identity_cache WHERE identity_url=?1", params![identity_url])?;
        Ok(n > 0)
    }

    pub fn clear_cache(&self) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n = conn.execute("DELETE FROM identity_cache", [])?;
        Ok(n as u64)
    }

    pub fn count_cache_entries(&self) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM identity_cache", [], |r| r.get(0))?;
        Ok(n)
    }

    /// Identity URLs whose document body is older than `cutoff_ms`, oldest first.
    pub fn list_stale_cache_urls(&self, cutoff_ms: i64, limit: u32) -> Result<Vec<String>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(10_000) as i64;
        let mut stmt = conn.prepare(
            "SELECT identity_url FROM identity_cache WHERE stored_at_ms < ?1 ORDER BY stored_at_ms ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cutoff_ms, limit], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // OAuth client registrations.

    pub fn get_oauth_client(&self, instance_domain: &str) -> Result<Option<OAuthClientRegistration>> {
        let conn = Connection::open(&self.path)?;
        read_oauth_client(&conn, instance_domain)
    }

    /// Stores `reg` unless the domain already has a registration; returns the
    /// row that is live afterwards and whether it was created by this call.
    pub fn insert_oauth_client_if_absent(
        &self,
        reg: &OAuthClientRegistration,
    ) -> Result<(OAuthClientRegistration, bool)> {
        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            r#"
            INSERT INTO oauth_clients(instance_domain, client_id, client_secret, redirect_uri, scopes, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(instance_domain) DO NOTHING
            "#,
            params![
                reg.instance_domain,
                reg.client_id,
                reg.client_secret,
                reg.redirect_uri,
                reg.scopes,
                reg.created_at_ms
            ],
        )?;
        let live = read_oauth_client(&tx, &reg.instance_domain)?
            .context("oauth client row missing after insert")?;
        tx.commit()?;
        Ok((live, inserted > 0))
    }

    pub fn count_oauth_clients(&self) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM oauth_clients", [], |r| r.get(0))?;
        Ok(n)
    }

    // Request ledger.

    pub fn insert_request_log(&self, entry: &RequestLogEntry) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT INTO request_log(remote_host, ts_ms, success, latency_ms) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.remote_host,
                entry.timestamp_ms,
                if entry.success { 1 } else { 0 },
                entry.latency_ms
            ],
        )?;
        Ok(())
    }

    pub fn count_requests_between(&self, host: &str, since_ms: i64, until_ms: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n: u64 = conn.query_row(
            "SELECT COUNT(*) FROM request_log WHERE remote_host=?1 AND ts_ms >= ?2 AND ts_ms <= ?3",
            params![host, since_ms, until_ms],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    pub fn list_requests_between(
        &self,
        host: &str,
        since_ms: i64,
        until_ms: i64,
        limit: u32,
    ) -> Result<Vec<RequestLogEntry>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(10_000) as i64;
        let mut stmt = conn.prepare(
            r#"
            SELECT remote_host, ts_ms, success, latency_ms
            FROM request_log
            WHERE remote_host=?1 AND ts_ms >= ?2 AND ts_ms <= ?3
            ORDER BY ts_ms DESC, id DESC
            LIMIT ?4
            "#,
        )?;
        let rows = stmt
            .query_map(params![host, since_ms, until_ms, limit], |r| {
                let success: i64 = r.get(2)?;
                Ok(RequestLogEntry {
                    remote_host: r.get(0)?,
                    timestamp_ms: r.get(1)?,
                    success: success != 0,
                    latency_ms: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_hot_hosts(&self, since_ms: i64, until_ms: i64, threshold: u64) -> Result<Vec<HotHost>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT remote_host, COUNT(*) AS cnt, MAX(ts_ms)
            FROM request_log
            WHERE ts_ms >= ?1 AND ts_ms <= ?2
            GROUP BY remote_host
            HAVING cnt > ?3
            ORDER BY cnt DESC, remote_host ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![since_ms, until_ms, threshold as i64], |r| {
                Ok(HotHost {
                    host: r.get(0)?,
                    count: r.get(1)?,
                    latest_timestamp_ms: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `(success, latency_ms)` for every row of `host` in the window.
    pub fn request_outcomes_between(&self, host: &str, since_ms: i64, until_ms: i64) -> Result<Vec<(bool, i64)>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(
            "SELECT success, latency_ms FROM request_log WHERE remote_host=?1 AND ts_ms >= ?2 AND ts_ms <= ?3",
        )?;
        let rows = stmt
            .query_map(params![host, since_ms, until_ms], |r| {
                let success: i64 = r.get(0)?;
                Ok((success != 0, r.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_requests_for_host(&self, host: &str) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n = conn.execute("DELETE FROM request_log WHERE remote_host=?1", params![host])?;
        Ok(n as u64)
    }

    pub fn prune_requests_before(&self, cutoff_ms: i64) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n = conn.execute("DELETE FROM request_log WHERE ts_ms < ?1", params![cutoff_ms])?;
        Ok(n as u64)
    }

    // Host reputation.

    pub fn get_host_reputation(&self, host: &str) -> Result<Option<HostReputation>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            "SELECT host, status, reason, updated_by, updated_at_ms FROM host_reputation WHERE host=?1",
            params![host],
            read_reputation_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn upsert_host_reputation(&self, rep: &HostReputation) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            r#"
            INSERT INTO host_reputation(host, status, reason, updated_by, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(host) DO UPDATE SET
              status=excluded.status,
              reason=excluded.reason,
              updated_by=excluded.updated_by,
              updated_at_ms=excluded.updated_at_ms
            "#,
            params![rep.host, rep.status.as_str(), rep.reason, rep.updated_by, rep.updated_at_ms],
        )?;
        Ok(())
    }

    pub fn delete_host_reputation(&self, host: &str) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let n = conn.execute("DELETE FROM host_reputation WHERE host=?1", params![host])?;
        Ok(n > 0)
    }

    pub fn list_host_reputations(&self, limit: u32) -> Result<Vec<HostReputation>> {
        let conn = Connection::open(&self.path)?;
        let limit = limit.max(1).min(10_000) as i64;
        let mut stmt = conn.prepare(
            "SELECT host, status, reason, updated_by, updated_at_ms FROM host_reputation ORDER BY updated_at_ms DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], read_reputation_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // Local actors and their relations.

    pub fn upsert_local_actor(&self, actor: &LocalActor) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            r#"
            INSERT INTO local_actors(username, display_name, summary, public_key_pem, icon_url, icon_media_type, federation_enabled, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(username) DO UPDATE SET
              display_name=excluded.display_name,
              summary=excluded.summary,
              public_key_pem=excluded.public_key_pem,
              icon_url=excluded.icon_url,
              icon_media_type=excluded.icon_media_type,
              federation_enabled=excluded.federation_enabled
            "#,
            params![
                actor.username,
                actor.display_name,
                actor.summary,
                actor.public_key_pem,
                actor.icon_url,
                actor.icon_media_type,
                if actor.federation_enabled { 1 } else { 0 },
                actor.created_at_ms
            ],
        )?;
        Ok(())
    }

    pub fn get_local_actor(&self, username: &str) -> Result<Option<LocalActor>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            r#"
            SELECT username, display_name, summary, public_key_pem, icon_url, icon_media_type, federation_enabled, created_at_ms
            FROM local_actors WHERE username=?1
            "#,
            params![username],
            |r| {
                let enabled: i64 = r.get(6)?;
                Ok(LocalActor {
                    username: r.get(0)?,
                    display_name: r.get(1)?,
                    summary: r.get(2)?,
                    public_key_pem: r.get(3)?,
                    icon_url: r.get(4)?,
                    icon_media_type: r.get(5)?,
                    federation_enabled: enabled != 0,
                    created_at_ms: r.get(7)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn set_local_actor_federation(&self, username: &str, enabled: bool) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let n = conn.execute(
            "UPDATE local_actors SET federation_enabled=?2 WHERE username=?1",
            params![username, if enabled { 1 } else { 0 }],
        )?;
        Ok(n > 0)
    }

    pub fn add_relation(&self, username: &str, relation: Relation, actor_id: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT OR IGNORE INTO local_relations(username, relation, actor_id, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![username, relation.as_str(), actor_id, now_ms()],
        )?;
        Ok(())
    }

    pub fn remove_relation(&self, username: &str, relation: Relation, actor_id: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "DELETE FROM local_relations WHERE username=?1 AND relation=?2 AND actor_id=?3",
            params![username, relation.as_str(), actor_id],
        )?;
        Ok(())
    }

    pub fn count_relation(&self, username: &str, relation: Relation) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let n: u64 = conn.query_row(
            "SELECT COUNT(*) FROM local_relations WHERE username=?1 AND relation=?2",
            params![username, relation.as_str()],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    pub fn list_relation(&self, username: &str, relation: Relation, offset: u64, limit: u32) -> Result<Vec<String>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT actor_id FROM local_relations
            WHERE username=?1 AND relation=?2
            ORDER BY created_at_ms ASC, actor_id ASC
            LIMIT ?3 OFFSET ?4
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![username, relation.as_str(), limit as i64, offset as i64],
                |r| r.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // Roles.

    pub fn grant_role(&self, actor_id: &str, role: Role) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT OR IGNORE INTO user_roles(actor_id, role) VALUES (?1, ?2)",
            params![actor_id, role.as_str()],
        )?;
        Ok(())
    }

    pub fn revoke_role(&self, actor_id: &str, role: Role) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "DELETE FROM user_roles WHERE actor_id=?1 AND role=?2",
            params![actor_id, role.as_str()],
        )?;
        Ok(())
    }

    pub fn list_roles(&self, actor_id: &str) -> Result<Vec<Role>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare("SELECT role FROM user_roles WHERE actor_id=?1")?;
        let rows = stmt
            .query_map(params![actor_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.iter().filter_map(|s| Role::parse(s)).collect())
    }
}

fn read_oauth_client(conn: &Connection, instance_domain: &str) -> Result<Option<OAuthClientRegistration>> {
    conn.query_row(
        r#"
        SELECT instance_domain, client_id, client_secret, redirect_uri, scopes, created_at_ms
        FROM oauth_clients WHERE instance_domain=?1
        "#,
        params![instance_domain],
        |r| {
            Ok(OAuthClientRegistration {
                instance_domain: r.get(0)?,
                client_id: r.get(1)?,
                client_secret: r.get(2)?,
                redirect_uri: r.get(3)?,
                scopes: r.get(4)?,
                created_at_ms: r.get(5)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

fn read_reputation_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<HostReputation> {
    let status: String = r.get(1)?;
    Ok(HostReputation {
        host: r.get(0)?,
        // The CHECK constraint keeps unknown labels out of the table.
        status: HostStatus::parse(&status).unwrap_or(HostStatus::Normal),
        reason: r.get(2)?,
        updated_by: r.get(3)?,
        updated_at_ms: r.get(4)?,
    })
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    /// Base URL local identities are published under, e.g. `https://social.example`.
    pub public_base_url: String,
    pub domain: String,
    /// Client name announced during dynamic client registration.
    pub instance_name: String,
    pub instance_website: Option<String>,
    pub data_dir: Option<String>,
    /// Hard deadline for every outbound call (seconds).
    pub http_timeout_secs: u64,
    pub http_attempts: u32,
    pub cache_ttl_secs: u64,
    pub memory_cache_enabled: bool,
    pub memory_cache_max_entries: usize,
    pub page_size: u32,
    pub oauth_scopes: String,
    /// Scheme used to reach remote servers for discovery and registration.
    pub remote_scheme: String,
    /// When set, `/_gateway/*` endpoints require it in `x-gateway-token`.
    pub internal_token: Option<String>,
    pub state_max_age_secs: u64,
    /// Interval of the stale-cache refresh loop in the service binary; 0 disables it.
    pub cache_sweep_interval_secs: u64,
    pub user_agent: String,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` for outbound calls.
    pub use_env_proxy: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8790".to_string(),
            public_base_url: "http://127.0.0.1:8790".to_string(),
            domain: "localhost".to_string(),
            instance_name: "fedgate".to_string(),
            instance_website: None,
            data_dir: None,
            http_timeout_secs: 5,
            http_attempts: 2,
            cache_ttl_secs: 3600,
            memory_cache_enabled: true,
            memory_cache_max_entries: 10_000,
            page_size: 50,
            oauth_scopes: "read".to_string(),
            remote_scheme: "https".to_string(),
            internal_token: None,
            state_max_age_secs: 600,
            cache_sweep_interval_secs: 0,
            user_agent: concat!("fedgate/", env!("CARGO_PKG_VERSION")).to_string(),
            use_env_proxy: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).context("parse gateway config json")?;
        Ok(cfg.normalized())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_env() -> Self {
        let d = Self::default();
        let cfg = Self {
            bind: env_str("FEDGATE_BIND").unwrap_or(d.bind),
            public_base_url: env_str("FEDGATE_PUBLIC_BASE_URL").unwrap_or(d.public_base_url),
            domain: env_str("FEDGATE_DOMAIN").unwrap_or(d.domain),
            instance_name: env_str("FEDGATE_INSTANCE_NAME").unwrap_or(d.instance_name),
            instance_website: env_str("FEDGATE_INSTANCE_WEBSITE").or(d.instance_website),
            data_dir: env_str("FEDGATE_DATA_DIR").or(d.data_dir),
            http_timeout_secs: env_parse("FEDGATE_HTTP_TIMEOUT_SECS").unwrap_or(d.http_timeout_secs),
            http_attempts: env_parse("FEDGATE_HTTP_ATTEMPTS").unwrap_or(d.http_attempts),
            cache_ttl_secs: env_parse("FEDGATE_CACHE_TTL_SECS").unwrap_or(d.cache_ttl_secs),
            memory_cache_enabled: env_bool("FEDGATE_MEMORY_CACHE").unwrap_or(d.memory_cache_enabled),
            memory_cache_max_entries: env_parse("FEDGATE_MEMORY_CACHE_MAX")
                .unwrap_or(d.memory_cache_max_entries),
            page_size: env_parse("FEDGATE_PAGE_SIZE").unwrap_or(d.page_size),
            oauth_scopes: env_str("FEDGATE_OAUTH_SCOPES").unwrap_or(d.oauth_scopes),
            remote_scheme: env_str("FEDGATE_REMOTE_SCHEME").unwrap_or(d.remote_scheme),
            internal_token: env_str("FEDGATE_INTERNAL_TOKEN").or(d.internal_token),
            state_max_age_secs: env_parse("FEDGATE_STATE_MAX_AGE_SECS").unwrap_or(d.state_max_age_secs),
            cache_sweep_interval_secs: env_parse("FEDGATE_CACHE_SWEEP_INTERVAL_SECS")
                .unwrap_or(d.cache_sweep_interval_secs),
            user_agent: env_str("FEDGATE_USER_AGENT").unwrap_or(d.user_agent),
            use_env_proxy: env_bool("FEDGATE_USE_ENV_PROXY").unwrap_or(d.use_env_proxy),
        };
        cfg.normalized()
    }

    fn normalized(mut self) -> Self {
        self.public_base_url = self.public_base_url.trim().trim_end_matches('/').to_string();
        self.domain = self.domain.trim().to_ascii_lowercase();
        self.http_timeout_secs = self.http_timeout_secs.clamp(1, 30);
        self.http_attempts = self.http_attempts.clamp(1, 5);
        self.page_size = self.page_size.clamp(1, 500);
        self.memory_cache_max_entries = self.memory_cache_max_entries.min(1_000_000);
        self.remote_scheme = match self.remote_scheme.trim().to_ascii_lowercase().as_str() {
            "http" => "http".to_string(),
            _ => "https".to_string(),
        };
        if self.oauth_scopes.trim().is_empty() {
            self.oauth_scopes = "read".to_string();
        }
        self.internal_token = self.internal_token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(d) => PathBuf::from(d),
            None => default_data_dir()?,
        };
        std::fs::create_dir_all(&dir).with_context(|| format!("create data dir: {}", dir.display()))?;
        Ok(dir.join("fedgate.db"))
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    let proj = ProjectDirs::from("net", "fedgate", "Fedgate")
        .context("unable to determine platform data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.parse::<T>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_defaults_and_clamps() {
        let cfg = GatewayConfig::from_json(
            r#"{"public_base_url": "https://social.example/", "http_timeout_secs": 600, "remote_scheme": "gopher"}"#,
        )
        .unwrap();
        assert_eq!(cfg.public_base_url, "https://social.example");
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.remote_scheme, "https");
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.cache_ttl_secs, 3600);
    }
}

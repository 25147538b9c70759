/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rand::{rngs::OsRng, RngCore};
use tracing::error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("could not reach {host}: {detail}")]
    Unreachable { host: String, detail: String },

    #[error("{domain} does not support {detail}")]
    UnsupportedPeer { domain: String, detail: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid handle {0:?}: expected user@domain")]
    InvalidHandle(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("gone: {0}")]
    Gone(String),

    #[error("internal error (correlation id {correlation_id})")]
    Storage {
        correlation_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl GatewayError {
    /// Wraps a backing-store failure, logging it under a fresh correlation id.
    pub fn storage(source: anyhow::Error) -> Self {
        let correlation_id = correlation_id();
        error!(correlation_id = %correlation_id, "storage error: {source:#}");
        Self::Storage {
            correlation_id,
            source,
        }
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(e: anyhow::Error) -> Self {
        Self::storage(e)
    }
}

fn correlation_id() -> String {
    let mut b = [0u8; 8];
    OsRng.fill_bytes(&mut b);
    hex::encode(b)
}

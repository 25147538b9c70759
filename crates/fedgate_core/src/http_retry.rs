/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Sends the request built by `build`, retrying 429/5xx answers and transport
/// errors with jittered exponential backoff. Callers bound the total time.
pub async fn send_with_retry<F>(mut build: F, attempts: u32) -> reqwest::Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = attempts.clamp(1, 5);
    let mut backoff = Duration::from_millis(200);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let last = attempt >= max_attempts;
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if !should_retry_status(status) || last {
                    return Ok(resp);
                }
                debug!(%status, attempt, "retrying outbound request");
            }
            Err(e) => {
                if last {
                    return Err(e);
                }
                debug!(attempt, "retrying outbound request after transport error: {e}");
            }
        }
        sleep_with_jitter(backoff).await;
        backoff = backoff.saturating_mul(2).min(Duration::from_secs(5));
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_only_throttling_and_server_errors() {
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!should_retry_status(StatusCode::NOT_FOUND));
        assert!(!should_retry_status(StatusCode::OK));
    }
}

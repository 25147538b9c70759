/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use http::Uri;

/// Lowercased host of an absolute URL, without port.
pub fn host_from_url(url: &str) -> Option<String> {
    let uri: Uri = url.trim().parse().ok()?;
    uri.scheme()?;
    uri.host().map(normalize_host).filter(|h| !h.is_empty())
}

pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Wildcard rows that could cover `host`, most specific first:
/// `a.b.example.com` yields `*.a.b.example.com`, `*.b.example.com`, `*.example.com`, `*.com`.
pub fn wildcard_candidates(host: &str) -> Vec<String> {
    let host = normalize_host(host);
    let mut out = Vec::new();
    let mut rest = host.as_str();
    loop {
        if !rest.is_empty() {
            out.push(format!("*.{rest}"));
        }
        match rest.split_once('.') {
            Some((_, tail)) => rest = tail,
            None => break,
        }
    }
    out
}

/// Last non-empty path segment of a URL, or the trimmed input when it has none.
pub fn last_path_segment(reference: &str) -> String {
    let trimmed = reference.trim();
    let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => without_query,
    };
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .map(|s| s.trim_start_matches('@').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| trimmed.to_string())
}

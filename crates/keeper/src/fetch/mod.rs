// ABOUTME: HTTP resource fetching with header sets, retry policy and charset decoding.
// ABOUTME: Shared by article, API, stylesheet and image downloads.

pub mod strategy;

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

use crate::config::RetryPolicy;
use crate::error::ArchiveError;

pub use strategy::{ApiArticle, Fetcher, RawDocument};

/// Maximum accepted body size (32 MB).
pub const MAX_CONTENT_LENGTH: usize = 32 * 1024 * 1024;

/// Request headers keyed by lowercase name; later inserts override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet(BTreeMap<String, String>);

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Insert every pair, overriding existing names.
    pub fn extend<'a, I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in pairs {
            self.set(name, value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Options for a single fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HeaderSet,
    /// Per-request timeout; the client's default applies when unset.
    pub timeout: Option<Duration>,
    /// Ignore declared and detected charsets and decode as UTF-8.
    pub force_utf8: bool,
}

/// Result of a successful fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decode the body as text, using charset hints from the content-type header.
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }

    /// Decode the body as UTF-8 regardless of any declared charset.
    pub fn text_utf8_forced(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the response declares a JSON content type.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
pub(crate) fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    for part in lower.split(';') {
        let trimmed = part.trim();
        if let Some(charset) = trimmed.strip_prefix("charset=") {
            let charset = charset.trim_matches('"').trim_matches('\'');
            return Some(charset.to_string());
        }
    }
    None
}

/// Fetch a resource once. Non-2xx statuses are errors.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult, ArchiveError> {
    let parsed_url = url::Url::parse(url).map_err(|e| {
        ArchiveError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    let scheme = parsed_url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ArchiveError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }

    let mut request = client.get(parsed_url);
    for (key, value) in opts.headers.iter() {
        request = request.header(key, value);
    }
    if let Some(timeout) = opts.timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(|e| {
        ArchiveError::network(url, "Fetch", Some(anyhow::anyhow!("request failed: {}", e)))
    })?;

    if let Some(len) = response.content_length() {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(ArchiveError::network(
                url,
                "Fetch",
                Some(anyhow::anyhow!("content too large")),
            ));
        }
    }

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    if !(200..300).contains(&status) {
        return Err(ArchiveError::network(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP status {}", status)),
        ));
    }

    let body = response.bytes().await.map_err(|e| {
        ArchiveError::network(
            url,
            "Fetch",
            Some(anyhow::anyhow!("failed to read body: {}", e)),
        )
    })?;
    if body.len() > MAX_CONTENT_LENGTH {
        return Err(ArchiveError::network(
            url,
            "Fetch",
            Some(anyhow::anyhow!("content too large")),
        ));
    }

    Ok(FetchResult {
        status,
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}

/// Fetch with retries; the last error is returned once attempts are exhausted.
pub async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
    policy: RetryPolicy,
) -> Result<FetchResult, ArchiveError> {
    let mut attempt = 1;
    loop {
        match fetch(client, url, opts).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_invalid_url() || attempt >= policy.attempts => return Err(e),
            Err(e) => {
                tracing::warn!(%url, attempt, attempts = policy.attempts, error = %e, "Request failed, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

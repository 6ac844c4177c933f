// ABOUTME: Platform-aware document fetching: direct page GETs with warm-up, or JSON API calls.
// ABOUTME: Builds per-platform header sets from defaults, platform records, configuration and options.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Local, TimeZone};
use rand::Rng;
use serde_json::Value;

use crate::config::ConfigStore;
use crate::error::ArchiveError;
use crate::extract::date::normalize_date;
use crate::fetch::{fetch, fetch_with_retry, FetchOptions, FetchResult, HeaderSet};
use crate::platform::{ApiSpec, FetchMode, PlatformStrategy};

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Fields mapped straight out of a platform API payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiArticle {
    pub title: String,
    pub author: String,
    /// Canonical `YYYY-MM-DD`.
    pub date: String,
    pub content_html: String,
}

impl ApiArticle {
    /// Minimal HTML document wrapping the API fields, so later stages see a page like any other.
    pub fn to_document(&self) -> String {
        format!(
            concat!(
                "<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>",
                "<article><h1 class=\"Post-Title\">{title}</h1>",
                "<div class=\"Post-Author\"><span class=\"author-name\">{author}</span>",
                "<span class=\"post-time\">{date}</span></div>",
                "<div class=\"Post-Content\">{content}</div></article></body></html>"
            ),
            title = escape_html(&self.title),
            author = escape_html(&self.author),
            date = escape_html(&self.date),
            content = self.content_html,
        )
    }
}

/// What a platform's fetch produced.
#[derive(Debug, Clone)]
pub enum RawDocument {
    /// A decoded HTML page.
    Html(String),
    /// Structured fields from a JSON API.
    Api(ApiArticle),
}

pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Performs requests on behalf of a platform strategy.
#[derive(Debug, Clone, Copy)]
pub struct Fetcher<'a> {
    pub client: &'a reqwest::Client,
    pub config: &'a ConfigStore,
    pub user_agent: &'a str,
    pub extra_headers: &'a HashMap<String, String>,
}

impl<'a> Fetcher<'a> {
    /// Headers for a platform, lowest precedence first: defaults, platform record,
    /// configured headers and cookies, then caller-supplied headers.
    pub fn headers_for(&self, strategy: &PlatformStrategy) -> HeaderSet {
        let mut headers = HeaderSet::new();
        let ua = self
            .config
            .random_user_agent()
            .unwrap_or_else(|| self.user_agent.to_string());
        headers.set("User-Agent", ua);
        headers.set("Accept", DEFAULT_ACCEPT);
        headers.set("Accept-Language", DEFAULT_ACCEPT_LANGUAGE);
        headers.extend(&strategy.headers);
        headers.extend(&self.config.headers(&strategy.flag));
        if let Some(cookie) = self.config.cookie_header(&strategy.flag) {
            headers.set("Cookie", cookie);
        }
        headers.extend(self.extra_headers.iter());
        headers
    }

    fn options_for(&self, strategy: &PlatformStrategy) -> FetchOptions {
        FetchOptions {
            headers: self.headers_for(strategy),
            timeout: Some(self.config.timeout(&strategy.flag)),
            force_utf8: strategy.force_utf8,
        }
    }

    /// Fetch the raw document for an article URL using the platform's fetch mode.
    pub async fn fetch_document(
        &self,
        strategy: &PlatformStrategy,
        url: &str,
    ) -> Result<RawDocument, ArchiveError> {
        match &strategy.fetch {
            FetchMode::Direct {
                warmup,
                warmup_delay_ms,
            } => {
                let opts = self.options_for(strategy);
                self.warm_up(warmup, *warmup_delay_ms, &opts).await;
                let policy = self.config.retry_policy(&strategy.flag);
                let result = fetch_with_retry(self.client, url, &opts, policy).await?;
                tracing::debug!(%url, status = result.status, bytes = result.body.len(), "Fetched article page");
                let html = if opts.force_utf8 {
                    result.text_utf8_forced()
                } else {
                    result.text()
                };
                Ok(RawDocument::Html(html))
            }
            FetchMode::Api(api) => self
                .fetch_api(strategy, api, url)
                .await
                .map(RawDocument::Api),
        }
    }

    async fn warm_up(&self, urls: &[String], delay_ms: [u64; 2], opts: &FetchOptions) {
        for warm_url in urls {
            match fetch(self.client, warm_url, opts).await {
                Ok(r) => tracing::debug!(url = %warm_url, status = r.status, "Warm-up request done"),
                Err(e) => tracing::warn!(url = %warm_url, error = %e, "Warm-up request failed"),
            }
            let (lo, hi) = (delay_ms[0].min(delay_ms[1]), delay_ms[0].max(delay_ms[1]));
            let pause = rand::thread_rng().gen_range(lo..=hi);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }

    async fn fetch_api(
        &self,
        strategy: &PlatformStrategy,
        api: &ApiSpec,
        url: &str,
    ) -> Result<ApiArticle, ArchiveError> {
        let article_id = article_id(url).ok_or_else(|| {
            ArchiveError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("no article id in URL path")))
        })?;
        let endpoint = self
            .config
            .endpoint(&strategy.flag, &api.endpoint, &[(api.id_placeholder.as_str(), article_id.as_str())])
            .ok_or_else(|| {
                ArchiveError::parse(
                    url,
                    "Fetch",
                    Some(anyhow::anyhow!(
                        "endpoint {:?} is not configured for {}",
                        api.endpoint,
                        strategy.flag
                    )),
                )
            })?;
        tracing::info!(%url, %endpoint, "Fetching article through API");

        let mut opts = self.options_for(strategy);
        for (name, value) in &api.headers {
            opts.headers.set(name, value.clone());
        }
        opts.headers.set("Referer", url);
        opts.headers.extend(self.extra_headers.iter());

        let policy = self.config.retry_policy(&strategy.flag);
        let result = fetch_with_retry(self.client, &endpoint, &opts, policy).await?;
        map_api_payload(strategy, api, url, &result)
    }

    /// Download every stylesheet and concatenate the bodies; failures are skipped.
    pub async fn fetch_stylesheets(&self, links: &[String]) -> String {
        let mut css = String::new();
        let opts = FetchOptions {
            headers: {
                let mut h = HeaderSet::new();
                h.set("User-Agent", self.user_agent);
                h
            },
            ..Default::default()
        };
        for link in links {
            match fetch(self.client, link, &opts).await {
                Ok(result) => {
                    css.push_str(&result.text());
                    css.push('\n');
                }
                Err(e) => tracing::debug!(url = %link, error = %e, "Skipping stylesheet"),
            }
        }
        css
    }

    /// Download raw bytes, sending only the user agent and a referer.
    pub async fn fetch_resource(&self, url: &str, referer: &str) -> Result<FetchResult, ArchiveError> {
        let mut headers = HeaderSet::new();
        headers.set("User-Agent", self.user_agent);
        headers.set("Referer", referer);
        let opts = FetchOptions {
            headers,
            ..Default::default()
        };
        fetch(self.client, url, &opts).await
    }
}

/// Last non-empty path segment of a URL.
pub fn article_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

fn string_at(payload: &Value, pointer: &str) -> Option<String> {
    match payload.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch seconds, or milliseconds when the value has more than ten digits.
/// Values outside the representable range yield `None`.
fn epoch_to_date(value: i64) -> Option<String> {
    let secs = if value.unsigned_abs().to_string().len() > 10 {
        value / 1000
    } else {
        value
    };
    Local
        .timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn map_api_payload(
    strategy: &PlatformStrategy,
    api: &ApiSpec,
    url: &str,
    result: &FetchResult,
) -> Result<ApiArticle, ArchiveError> {
    if !result.is_json() {
        return Err(ArchiveError::parse(
            url,
            "Fetch",
            Some(anyhow::anyhow!(
                "expected a JSON response, got {}",
                result.content_type.as_deref().unwrap_or("no content type")
            )),
        ));
    }
    let payload: Value = serde_json::from_slice(&result.body).map_err(|e| {
        ArchiveError::parse(url, "Fetch", Some(anyhow::anyhow!("invalid JSON payload: {}", e)))
    })?;

    let date = match payload.pointer(&api.date) {
        Some(Value::Number(n)) => n.as_i64().and_then(epoch_to_date),
        Some(Value::String(s)) => Some(normalize_date(s, strategy.date_style)),
        _ => None,
    }
    .unwrap_or_else(crate::extract::date::today);

    Ok(ApiArticle {
        title: string_at(&payload, &api.title).unwrap_or_default(),
        author: string_at(&payload, &api.author)
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| strategy.author_fallback().to_string()),
        date,
        content_html: string_at(&payload, &api.content).unwrap_or_default(),
    })
}

// ABOUTME: Concurrent image reference rewriting for article content.
// ABOUTME: Resolves lazy-load sources, strips or transcodes WebP images, and rewrites src attributes.

//! Image rewriting.
//!
//! Rewriting runs in three phases so no parsed document is held across an
//! await point:
//! 1. plan: parse the content, resolve each `<img>` source, decide what to do;
//! 2. fetch: download and transcode in a bounded `buffer_unordered` fan-out;
//! 3. apply: re-parse the content and write the results back by image index.
//!
//! Per-image failures are logged and leave that `<img>` untouched.

use std::path::Path;

use dom_query::{Document, Selection};
use futures::stream::{self, StreamExt};
use image::{DynamicImage, ImageFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use uuid::Uuid;

use crate::fetch::Fetcher;

/// Source attributes checked in order; the first non-empty one wins.
pub const SOURCE_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-original-src",
    "data-backgroud",
    "data-original",
];

/// Lazy-load attributes removed once an image has been rewritten.
const STALE_ATTRS: &[&str] = &["data-src", "data-original"];

/// Subdirectory of the article folder holding transcoded images.
pub const IMAGES_DIR: &str = "images";

static JIANSHU_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|imageView2/2/w/\d+/format/webp").expect("valid regex"));
static JIANSHU_QUERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?.*format/webp").expect("valid regex"));

/// How image sources are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Make sources absolute and transcode WebP images into the images folder.
    Localize,
    /// Make sources absolute only.
    ResolveOnly,
}

/// Result of rewriting one content fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteOutcome {
    pub html: String,
    /// Resolved absolute source of every image, in document order.
    pub sources: Vec<String>,
    /// Images written to the images folder.
    pub localized: usize,
    /// Images whose download or transcode failed.
    pub failed: usize,
}

#[derive(Debug, Clone)]
enum Action {
    /// Point `src` at this URL without any network traffic.
    Resolve(String),
    /// Download and transcode into the images folder.
    Transcode(String),
}

#[derive(Debug, Clone)]
struct ImageJob {
    index: usize,
    action: Action,
}

/// Whether a URL names a WebP image.
pub fn is_webp(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains(".webp") || lower.contains("format/webp")
}

/// Absolute form of an image source, or `None` for empty and `data:` sources.
pub fn resolve_source(src: &str, base: Option<&Url>) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    match base {
        Some(b) => b.join(src).ok().map(|u| u.to_string()),
        None => Url::parse(src).ok().map(|u| u.to_string()),
    }
}

fn candidate_source(el: &Selection) -> Option<String> {
    SOURCE_ATTRS.iter().find_map(|attr| {
        el.attr(attr)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Strip the jianshu image-service WebP conversion suffix, if this URL uses it.
fn jianshu_shortcut(url: &str) -> Option<String> {
    let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
    if !host.contains("jianshu.io") || !url.contains("format/webp") {
        return None;
    }
    let stripped = JIANSHU_SUFFIX_RE.replace_all(url, "");
    Some(JIANSHU_QUERY_RE.replace_all(&stripped, "").into_owned())
}

fn content_html(doc: &Document) -> String {
    doc.select("body").inner_html().to_string()
}

/// Rewrites `<img>` elements in an article fragment.
#[derive(Debug, Clone, Copy)]
pub struct ImageRewriter<'a> {
    fetcher: Fetcher<'a>,
    max_workers: usize,
}

impl<'a> ImageRewriter<'a> {
    pub fn new(fetcher: Fetcher<'a>, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers: max_workers.max(1),
        }
    }

    /// Rewrite every image in `html`. `folder` receives the `images/` subdirectory
    /// in [`RewriteMode::Localize`]. A fragment without images is returned unchanged.
    pub async fn rewrite(
        &self,
        html: &str,
        base_url: &str,
        folder: &Path,
        mode: RewriteMode,
    ) -> RewriteOutcome {
        let (jobs, sources) = plan(html, base_url, mode);
        if jobs.is_empty() {
            return RewriteOutcome {
                html: html.to_string(),
                sources,
                ..Default::default()
            };
        }

        let workers = self.max_workers.min(jobs.len());
        tracing::debug!(images = jobs.len(), workers, "Rewriting images");

        let images_dir = folder.join(IMAGES_DIR);
        let results: Vec<(usize, Option<String>)> = stream::iter(jobs)
            .map(|job| {
                let images_dir = images_dir.clone();
                async move {
                    let src = match job.action {
                        Action::Resolve(url) => Some(url),
                        Action::Transcode(url) => self.localize(&url, base_url, &images_dir).await,
                    };
                    (job.index, src)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut outcome = RewriteOutcome {
            sources,
            localized: results
                .iter()
                .filter(|(_, src)| src.as_deref().is_some_and(|s| s.starts_with(IMAGES_DIR)))
                .count(),
            failed: results.iter().filter(|(_, src)| src.is_none()).count(),
            ..Default::default()
        };
        outcome.html = apply(html, &results);
        if outcome.failed > 0 {
            tracing::warn!(failed = outcome.failed, total = results.len(), "Some images were left unchanged");
        }
        outcome
    }

    async fn localize(&self, url: &str, referer: &str, images_dir: &Path) -> Option<String> {
        let bytes = match self.fetcher.fetch_resource(url, referer).await {
            Ok(result) => result.body,
            Err(e) => {
                tracing::warn!(%url, error = %e, "Image download failed");
                return None;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(images_dir).await {
            tracing::warn!(dir = %images_dir.display(), error = %e, "Cannot create images folder");
            return None;
        }

        let simple = Uuid::new_v4().simple().to_string();
        let file_name = format!("img_{}.png", &simple[..8]);
        let path = images_dir.join(&file_name);
        let task_path = path.clone();
        let saved = tokio::task::spawn_blocking(move || transcode_to_png(&bytes, &task_path)).await;
        match saved {
            Ok(Ok(())) => {
                tracing::debug!(%url, path = %path.display(), "Transcoded image");
                Some(format!("{}/{}", IMAGES_DIR, file_name))
            }
            Ok(Err(e)) => {
                tracing::warn!(%url, error = %e, "Image transcode failed");
                None
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Image transcode task failed");
                None
            }
        }
    }
}

/// Decode any supported raster format and write it as PNG, keeping alpha when present.
pub fn transcode_to_png(bytes: &[u8], path: &Path) -> anyhow::Result<()> {
    let decoded = image::load_from_memory(bytes)?;
    let converted = if decoded.color().has_alpha() {
        DynamicImage::ImageRgba8(decoded.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(decoded.to_rgb8())
    };
    converted.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn plan(html: &str, base_url: &str, mode: RewriteMode) -> (Vec<ImageJob>, Vec<String>) {
    let doc = Document::from(html);
    let base = Url::parse(base_url).ok();
    let mut jobs = Vec::new();
    let mut sources = Vec::new();

    for (index, el) in doc.select("img").iter().enumerate() {
        let Some(raw) = candidate_source(&el) else {
            continue;
        };
        let Some(resolved) = resolve_source(&raw, base.as_ref()) else {
            continue;
        };
        sources.push(resolved.clone());

        let action = match mode {
            RewriteMode::ResolveOnly => Action::Resolve(resolved),
            RewriteMode::Localize if is_webp(&resolved) => match jianshu_shortcut(&resolved) {
                Some(stripped) => Action::Resolve(stripped),
                None => Action::Transcode(resolved),
            },
            RewriteMode::Localize => Action::Resolve(resolved),
        };
        jobs.push(ImageJob { index, action });
    }
    (jobs, sources)
}

fn apply(html: &str, results: &[(usize, Option<String>)]) -> String {
    let doc = Document::from(html);
    let images: Vec<Selection> = doc.select("img").iter().collect();
    for (index, src) in results {
        let (Some(el), Some(src)) = (images.get(*index), src) else {
            continue;
        };
        el.set_attr("src", src);
        for attr in STALE_ATTRS {
            el.remove_attr(attr);
        }
    }
    content_html(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgba8(2, 2)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn resolves_protocol_relative_and_relative_sources() {
        let base = Url::parse("https://blog.example.com/post/1").unwrap();
        assert_eq!(
            resolve_source("//cdn.example.com/a.png", Some(&base)).as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(
            resolve_source("../img/b.png", Some(&base)).as_deref(),
            Some("https://blog.example.com/img/b.png")
        );
        assert_eq!(resolve_source("data:image/png;base64,AAA", Some(&base)), None);
        assert_eq!(resolve_source("  ", Some(&base)), None);
    }

    #[test]
    fn webp_detection() {
        assert!(is_webp("https://x.com/a.WEBP"));
        assert!(is_webp("https://x.com/a?imageMogr2/format/webp"));
        assert!(!is_webp("https://x.com/a.png"));
    }

    #[test]
    fn jianshu_suffix_is_stripped() {
        assert_eq!(
            jianshu_shortcut("https://upload-images.jianshu.io/upload_images/1.png|imageView2/2/w/1240/format/webp")
                .as_deref(),
            Some("https://upload-images.jianshu.io/upload_images/1.png")
        );
        assert_eq!(
            jianshu_shortcut("https://upload-images.jianshu.io/1.png?imageMogr2/auto-orient/format/webp")
                .as_deref(),
            Some("https://upload-images.jianshu.io/1.png")
        );
        assert_eq!(jianshu_shortcut("https://other.io/1.png?format/webp"), None);
    }

    #[test]
    fn plan_prefers_src_then_lazy_attributes() {
        let html = r#"<div><img data-original="/c.png"><img src="" data-src="/b.png"><img src="/a.png"></div>"#;
        let (jobs, sources) = plan(html, "https://x.com/p", RewriteMode::ResolveOnly);
        assert_eq!(jobs.len(), 3);
        assert_eq!(
            sources,
            vec![
                "https://x.com/c.png".to_string(),
                "https://x.com/b.png".to_string(),
                "https://x.com/a.png".to_string(),
            ]
        );
    }

    #[test]
    fn transcode_keeps_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        transcode_to_png(&png_bytes(), &path).unwrap();
        let reread = image::open(&path).unwrap();
        assert!(reread.color().has_alpha());
    }

    #[tokio::test]
    async fn fragment_without_images_is_unchanged() {
        let client = reqwest::Client::new();
        let config = ConfigStore::default();
        let extra = HashMap::new();
        let fetcher = Fetcher {
            client: &client,
            config: &config,
            user_agent: "t",
            extra_headers: &extra,
        };
        let dir = tempfile::tempdir().unwrap();
        let html = "<div id=\"c\">\n  <p>No   pictures</p>\n</div>";
        let outcome = ImageRewriter::new(fetcher, 32)
            .rewrite(html, "https://x.com/p", dir.path(), RewriteMode::Localize)
            .await;
        assert_eq!(outcome.html, html);
        assert!(outcome.sources.is_empty());
        assert!(!dir.path().join(IMAGES_DIR).exists());
    }

    #[tokio::test]
    async fn failed_downloads_leave_sources_unchanged() {
        let server = MockServer::start();
        let png = png_bytes();
        for name in ["ok1", "ok2", "ok3"] {
            let body = png.clone();
            server.mock(move |when, then| {
                when.method(GET).path(format!("/{}.webp", name));
                then.status(200).header("content-type", "image/webp").body(body);
            });
        }
        server.mock(|when, then| {
            when.method(GET).path("/missing.webp");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/broken.webp");
            then.status(200).body("not an image");
        });

        let html = format!(
            r#"<div><img src="{0}/ok1.webp"><img data-src="{0}/ok2.webp"><img src="{0}/missing.webp"><img src="{0}/ok3.webp"><img src="{0}/broken.webp"></div>"#,
            server.base_url()
        );

        let client = reqwest::Client::new();
        let config = ConfigStore::default();
        let extra = HashMap::new();
        let fetcher = Fetcher {
            client: &client,
            config: &config,
            user_agent: "t",
            extra_headers: &extra,
        };
        let dir = tempfile::tempdir().unwrap();
        let outcome = ImageRewriter::new(fetcher, 2)
            .rewrite(&html, &server.url("/post"), dir.path(), RewriteMode::Localize)
            .await;

        assert_eq!(outcome.localized, 3);
        assert_eq!(outcome.failed, 2);

        let doc = Document::from(outcome.html.as_str());
        let srcs: Vec<String> = doc
            .select("img")
            .iter()
            .map(|el| el.attr("src").map(|s| s.to_string()).unwrap_or_default())
            .collect();
        let local = srcs.iter().filter(|s| s.starts_with("images/img_")).count();
        assert_eq!(local, 3, "got: {:?}", srcs);
        assert_eq!(srcs[2], format!("{}/missing.webp", server.base_url()));
        assert_eq!(srcs[4], format!("{}/broken.webp", server.base_url()));
        assert!(!outcome.html.contains("data-src"), "got: {}", outcome.html);

        let written = std::fs::read_dir(dir.path().join(IMAGES_DIR)).unwrap().count();
        assert_eq!(written, 3);
    }

    #[tokio::test]
    async fn resolve_only_never_downloads() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/a.webp");
            then.status(200).body("x");
        });
        let client = reqwest::Client::new();
        let config = ConfigStore::default();
        let extra = HashMap::new();
        let fetcher = Fetcher {
            client: &client,
            config: &config,
            user_agent: "t",
            extra_headers: &extra,
        };
        let dir = tempfile::tempdir().unwrap();
        let html = r#"<p><img data-src="/a.webp"></p>"#;
        let outcome = ImageRewriter::new(fetcher, 4)
            .rewrite(html, &server.url("/post"), dir.path(), RewriteMode::ResolveOnly)
            .await;
        mock.assert_hits(0);
        assert_eq!(outcome.sources, vec![server.url("/a.webp")]);
        assert!(outcome.html.contains(&format!("src=\"{}\"", server.url("/a.webp"))), "got: {}", outcome.html);
    }
}

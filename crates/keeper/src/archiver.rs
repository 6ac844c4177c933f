// ABOUTME: The Archiver: resolves a platform, fetches, extracts and validates an article, then serializes it.
// ABOUTME: Serializers run concurrently; the request fails only when none of them produced a file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use sha2::{Digest, Sha256};

use crate::article::Article;
use crate::error::ArchiveError;
use crate::extract::{extract_fields, fields_from_api, styles, ExtractedFields};
use crate::fetch::{Fetcher, RawDocument};
use crate::formats::{self, article_folder, file_stem, normalize_formats, Format, Manifest, SaveContext};
use crate::options::{ArchiverBuilder, Options};
use crate::platform::loader::load_builtin_registry;
use crate::platform::registry::PlatformRegistry;
use crate::platform::PlatformStrategy;

/// Pipeline stages, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Fetching,
    Parsing,
    ExtractingFields,
    Validating,
    Serializing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolving => "resolving",
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::ExtractingFields => "extracting",
            Stage::Validating => "validating",
            Stage::Serializing => "serializing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// First 16 hex characters of the SHA-256 of a URL; stable per article.
pub fn output_key(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.trim().as_bytes()));
    digest[..16].to_string()
}

/// Archives blog articles into local files.
#[derive(Debug, Clone)]
pub struct Archiver {
    opts: Options,
    http_client: reqwest::Client,
    registry: PlatformRegistry,
}

impl Archiver {
    /// Create a new ArchiverBuilder for configuring the archiver.
    pub fn builder() -> ArchiverBuilder {
        ArchiverBuilder::new()
    }

    /// Create a new Archiver with the given options.
    pub fn new(opts: Options) -> Self {
        let http_client = opts.http_client.clone().unwrap_or_else(|| {
            reqwest::Client::builder()
                .user_agent(&opts.user_agent)
                .timeout(opts.timeout)
                .cookie_store(true)
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Falling back to default HTTP client");
                    reqwest::Client::new()
                })
        });
        let registry = opts.registry.clone().unwrap_or_else(load_builtin_registry);

        Self {
            opts,
            http_client,
            registry,
        }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    fn fetcher(&self) -> Fetcher<'_> {
        Fetcher {
            client: &self.http_client,
            config: &self.opts.config,
            user_agent: &self.opts.user_agent,
            extra_headers: &self.opts.headers,
        }
    }

    fn resolve(&self, url: &str) -> Result<Arc<PlatformStrategy>, ArchiveError> {
        tracing::debug!(stage = %Stage::Resolving, %url);
        let strategy = self.registry.resolve(url).inspect_err(|e| {
            tracing::warn!(stage = %Stage::Failed, %url, error = %e, "No platform for URL");
        })?;
        tracing::info!(%url, platform = %strategy.name, flag = %strategy.flag, "Resolved platform");
        Ok(strategy)
    }

    /// Fetch and extract an article without writing anything.
    pub async fn extract(&self, url: &str) -> Result<Article, ArchiveError> {
        let strategy = self.resolve(url)?;
        tracing::info!(stage = %Stage::Fetching, %url);
        let raw = self
            .fetcher()
            .fetch_document(&strategy, url)
            .await
            .inspect_err(|e| tracing::warn!(stage = %Stage::Failed, %url, error = %e, "Fetch failed"))?;
        self.build_article(&strategy, url, raw).await
    }

    /// Extract an article from HTML the caller already has.
    pub async fn extract_html(&self, html: &str, url: &str) -> Result<Article, ArchiveError> {
        let strategy = self.resolve(url)?;
        self.build_article(&strategy, url, RawDocument::Html(html.to_string()))
            .await
    }

    async fn build_article(
        &self,
        strategy: &PlatformStrategy,
        url: &str,
        raw: RawDocument,
    ) -> Result<Article, ArchiveError> {
        tracing::debug!(stage = %Stage::Parsing, %url);
        let fields = match raw {
            RawDocument::Html(html) => {
                tracing::debug!(stage = %Stage::ExtractingFields, %url, bytes = html.len());
                extract_fields(&html, url, strategy)
            }
            RawDocument::Api(api) => fields_from_api(api, url, strategy),
        }
        .inspect_err(|e| tracing::warn!(stage = %Stage::Failed, %url, error = %e, "Extraction failed"))?;
        tracing::info!(
            stage = %Stage::Validating,
            %url,
            title = %fields.title,
            author = %fields.author,
            date = %fields.date,
            "Article fields extracted"
        );

        let css = self.collect_css(strategy, &fields).await;
        let content = fields.content_html.clone();
        Ok(fields.into_article(url, strategy, content, css))
    }

    /// Inline styles, then linked stylesheets, then the base and platform stylesheets.
    async fn collect_css(&self, strategy: &PlatformStrategy, fields: &ExtractedFields) -> String {
        let mut css = fields.inline_css.clone();
        if self.opts.fetch_stylesheets && !fields.stylesheet_links.is_empty() {
            css.push_str(&self.fetcher().fetch_stylesheets(&fields.stylesheet_links).await);
        }
        css.push_str(
            &styles::platform_css(self.opts.stylesheet_dir.as_deref(), strategy).await,
        );
        css
    }

    /// Fetch, extract and save an article in every requested format.
    pub async fn archive(
        &self,
        url: &str,
        output_dir: impl AsRef<Path>,
        formats: &[Format],
    ) -> Result<Manifest, ArchiveError> {
        let article = self.extract(url).await?;
        self.save(&article, output_dir.as_ref(), formats).await
    }

    /// Like [`Archiver::archive`] for HTML the caller already fetched.
    pub async fn archive_html(
        &self,
        html: &str,
        url: &str,
        output_dir: impl AsRef<Path>,
        formats: &[Format],
    ) -> Result<Manifest, ArchiveError> {
        let article = self.extract_html(html, url).await?;
        self.save(&article, output_dir.as_ref(), formats).await
    }

    /// Serialize an extracted article. Formats that fail are logged and left out
    /// of the manifest; an empty manifest is a parse error.
    pub async fn save(
        &self,
        article: &Article,
        output_dir: &Path,
        formats: &[Format],
    ) -> Result<Manifest, ArchiveError> {
        let requested = normalize_formats(formats);
        let folder = article_folder(output_dir, article);
        tracing::info!(
            stage = %Stage::Serializing,
            folder = %folder.display(),
            formats = ?requested.iter().map(|f| f.label()).collect::<Vec<_>>(),
        );
        tokio::fs::create_dir_all(&folder).await.map_err(|e| {
            ArchiveError::parse(
                &article.base_url,
                "Save",
                Some(anyhow::anyhow!("create {}: {}", folder.display(), e)),
            )
        })?;

        let ctx = SaveContext {
            article,
            folder,
            stem: file_stem(article),
            fetcher: self.fetcher(),
            image_workers: self.opts.image_workers,
            inline_content: self.opts.inline_content,
            pdf: &self.opts.pdf,
        };
        let results = join_all(requested.iter().map(|f| formats::save(&ctx, *f))).await;

        let mut manifest = Manifest::new();
        for (format, result) in requested.iter().zip(results) {
            match result {
                Ok(artifact) => manifest.push(artifact),
                Err(e) => tracing::warn!(format = format.label(), error = %e, "Format failed"),
            }
        }

        if manifest.is_empty() {
            tracing::warn!(stage = %Stage::Failed, url = %article.base_url, "No format was saved");
            return Err(ArchiveError::parse(
                &article.base_url,
                "Save",
                Some(anyhow::anyhow!("zero formats serialized")),
            ));
        }
        tracing::info!(stage = %Stage::Done, url = %article.base_url, artifacts = manifest.len());
        Ok(manifest)
    }
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CSDN_PAGE: &str = r#"<html><head><style>.code{opacity:0}</style></head><body>
        <h1 class="title-article">Rust 所有权</h1>
        <a class="follow-nickName">张三</a>
        <span class="time">2023-06-01 09:00</span>
        <div id="article_content"><p>借用检查器。</p></div>
        </body></html>"#;

    fn archiver() -> Archiver {
        Archiver::builder()
            .fetch_stylesheets(false)
            .pdf_renderer("/nonexistent/wkhtmltopdf")
            .build()
    }

    #[test]
    fn output_key_is_stable_hex() {
        let a = output_key("https://blog.csdn.net/x/article/details/1");
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, output_key(" https://blog.csdn.net/x/article/details/1 "));
        assert_ne!(a, output_key("https://blog.csdn.net/x/article/details/2"));
    }

    #[tokio::test]
    async fn css_is_inline_then_base() {
        let article = archiver()
            .extract_html(CSDN_PAGE, "https://blog.csdn.net/x/article/details/1")
            .await
            .unwrap();
        assert!(article.css.starts_with(".code{opacity: 1}\n"), "got: {}", article.css);
        assert!(article.css.ends_with(styles::BASE_CSS));
        assert_eq!(article.title, "Rust 所有权");
        assert_eq!(article.platform_name, "CSDN");
    }

    #[tokio::test]
    async fn all_formats_failing_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = archiver()
            .archive_html(
                CSDN_PAGE,
                "https://blog.csdn.net/x/article/details/1",
                dir.path(),
                &[Format::Pdf],
            )
            .await
            .unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("zero formats"), "got: {}", err);
    }

    #[tokio::test]
    async fn files_land_in_platform_author_folder() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = archiver()
            .archive_html(
                CSDN_PAGE,
                "https://blog.csdn.net/x/article/details/1",
                dir.path(),
                &[Format::Markdown, Format::Html],
            )
            .await
            .unwrap();
        let labels: Vec<&str> = manifest.iter().map(|a| a.format.as_str()).collect();
        assert_eq!(labels, vec!["md", "html"]);
        let md = manifest.get("md").unwrap();
        assert_eq!(
            Path::new(&md.download_path),
            dir.path().join("CSDN-张三").join("Rust所有权-张三-CSDN-2023-06-01.md")
        );
        assert!(md.inline_content.starts_with("# Rust 所有权\n\n"));
    }
}

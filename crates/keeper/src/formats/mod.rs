// ABOUTME: Output formats for archived articles: format identifiers, file naming, manifest and templates.
// ABOUTME: Each submodule persists one format and reports a FileArtifact.

//! Output format serializers.
//!
//! Every serializer receives a [`SaveContext`], rewrites the article's images
//! for its own needs, writes one file into the article folder and returns a
//! [`FileArtifact`]. Serializer failures are [`ArchiveError`]s with the
//! `Format` code; the pipeline logs them and drops the format from the
//! [`Manifest`].

pub mod html;
pub mod markdown;
pub mod mhtml;
pub mod pdf;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde::Serialize;

use crate::article::Article;
use crate::error::ArchiveError;
use crate::fetch::strategy::escape_html;
use crate::fetch::Fetcher;
use crate::images::{ImageRewriter, RewriteMode};

pub use pdf::PdfSettings;

/// Longest sanitized name component, in characters.
pub const MAX_NAME_CHARS: usize = 240;

static UNSAFE_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{3000}]+").expect("valid regex"));
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?\s*>").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

/// A supported output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Html,
    Markdown,
    Pdf,
    Mhtml,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Html, Format::Markdown, Format::Pdf, Format::Mhtml];

    /// Label used in the manifest.
    pub fn label(self) -> &'static str {
        match self {
            Format::Html => "html",
            Format::Markdown => "md",
            Format::Pdf => "pdf",
            Format::Mhtml => "mhtml",
        }
    }

    /// File extension including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Html => ".html",
            Format::Markdown => ".md",
            Format::Pdf => ".pdf",
            Format::Mhtml => ".mhtml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Format {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "html" => Ok(Format::Html),
            "markdown" | "md" => Ok(Format::Markdown),
            "pdf" => Ok(Format::Pdf),
            "mhtml" => Ok(Format::Mhtml),
            other => Err(ArchiveError::format(
                "",
                "Formats",
                Some(anyhow::anyhow!("unknown format {:?}", other)),
            )),
        }
    }
}

/// Requested formats in request order with duplicates removed; an empty request means HTML.
pub fn normalize_formats(requested: &[Format]) -> Vec<Format> {
    let mut formats = Vec::with_capacity(requested.len());
    for format in requested {
        if !formats.contains(format) {
            formats.push(*format);
        }
    }
    if formats.is_empty() {
        formats.push(Format::Html);
    }
    formats
}

/// Parse format identifiers such as `html`, `md`, `markdown`, `pdf`, `mhtml`.
pub fn parse_formats<I, S>(ids: I) -> Result<Vec<Format>, ArchiveError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parsed = ids
        .into_iter()
        .map(|id| id.as_ref().parse())
        .collect::<Result<Vec<Format>, _>>()?;
    Ok(normalize_formats(&parsed))
}

/// One persisted output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileArtifact {
    /// File name up to its first `.`.
    pub title: String,
    pub download_path: String,
    pub size_bytes: u64,
    /// Manifest label: `html`, `md`, `pdf` or `mhtml`.
    pub format: String,
    /// Full text for text formats when inline content is enabled, otherwise empty.
    pub inline_content: String,
}

/// Every artifact one archive request produced, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    artifacts: Vec<FileArtifact>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, artifact: FileArtifact) {
        self.artifacts.push(artifact);
    }

    pub fn artifacts(&self) -> &[FileArtifact] {
        &self.artifacts
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileArtifact> {
        self.artifacts.iter()
    }

    /// The artifact with this manifest label, if present.
    pub fn get(&self, label: &str) -> Option<&FileArtifact> {
        self.artifacts.iter().find(|a| a.format == label)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl IntoIterator for Manifest {
    type Item = FileArtifact;
    type IntoIter = std::vec::IntoIter<FileArtifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_iter()
    }
}

/// Make a string safe as a file-name component.
///
/// Reserved and control characters become `-`, all whitespace (including the
/// ideographic space) is removed, and the result is cut to [`MAX_NAME_CHARS`].
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_CHARS_RE.replace_all(name, "-");
    let compact = WHITESPACE_RE.replace_all(&replaced, "");
    compact.chars().take(MAX_NAME_CHARS).collect()
}

/// `<title>-<author>-<platform>-<date>` with the title and author sanitized.
pub fn file_stem(article: &Article) -> String {
    format!(
        "{}-{}-{}-{}",
        sanitize_filename(&article.title),
        sanitize_filename(&article.author),
        article.platform_name,
        article.date
    )
}

/// `<output_dir>/<platform>-<author>`.
pub fn article_folder(output_dir: &Path, article: &Article) -> PathBuf {
    output_dir.join(format!(
        "{}-{}",
        article.platform_name,
        sanitize_filename(&article.author)
    ))
}

/// Wrap content and stylesheet in the standalone article page.
pub fn render_html(article: &Article, content_html: &str) -> String {
    let title = escape_html(&article.title);
    format!(
        concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
            "<title>{title}</title>\n<style>\n{css}\n</style>\n</head>\n<body>\n",
            "<article>\n<h1><a href=\"{href}\">{title}</a></h1>\n{content}\n</article>\n",
            "</body>\n</html>\n"
        ),
        title = title,
        css = article.css,
        href = escape_html(&article.base_url),
        content = content_html,
    )
}

/// Convert HTML to Markdown using htmd.
///
/// Skips script and style tags during conversion, preserves links and images,
/// and normalizes consecutive blank lines to max 2.
/// On conversion error, returns the input unchanged.
pub fn html_to_markdown(html: &str) -> String {
    let preprocessed = BR_RE.replace_all(html, "\n");

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript"])
        .build();

    let md = converter
        .convert(&preprocessed)
        .unwrap_or_else(|_| preprocessed.to_string());

    BLANK_LINES_RE.replace_all(&md, "\n\n").to_string()
}

/// Convert HTML to plain text by extracting text nodes.
pub fn html_to_text(html: &str) -> String {
    let preprocessed = BR_RE.replace_all(html, "\n");
    let document = Html::parse_document(&preprocessed);
    let raw_text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    let normalized = SPACES_RE.replace_all(&raw_text, " ");
    NEWLINES_RE.replace_all(&normalized, "\n").trim().to_string()
}

/// Everything a serializer needs for one article.
#[derive(Debug, Clone)]
pub struct SaveContext<'a> {
    pub article: &'a Article,
    /// Article folder, created before any serializer runs.
    pub folder: PathBuf,
    pub stem: String,
    pub fetcher: Fetcher<'a>,
    pub image_workers: usize,
    pub inline_content: bool,
    pub pdf: &'a PdfSettings,
}

impl<'a> SaveContext<'a> {
    pub fn path_for(&self, format: Format) -> PathBuf {
        self.folder.join(format!("{}{}", self.stem, format.extension()))
    }

    pub(crate) fn rewriter(&self) -> ImageRewriter<'a> {
        ImageRewriter::new(self.fetcher, self.image_workers)
    }

    /// Article content with images localized into this folder.
    pub(crate) async fn localized_content(&self) -> String {
        self.rewriter()
            .rewrite(
                &self.article.content_html,
                &self.article.base_url,
                &self.folder,
                RewriteMode::Localize,
            )
            .await
            .html
    }

    pub(crate) fn error(&self, format: Format, source: anyhow::Error) -> ArchiveError {
        ArchiveError::format(&self.article.base_url, format!("Save {}", format), Some(source))
    }

    /// Write `bytes` to this format's path and describe the result.
    pub(crate) async fn write_artifact(
        &self,
        format: Format,
        bytes: &[u8],
        inline: Option<String>,
    ) -> Result<FileArtifact, ArchiveError> {
        let path = self.path_for(format);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| self.error(format, anyhow::anyhow!("write {}: {}", path.display(), e)))?;
        self.artifact(format, &path, inline).await
    }

    /// Describe a file a serializer already wrote.
    pub(crate) async fn artifact(
        &self,
        format: Format,
        path: &Path,
        inline: Option<String>,
    ) -> Result<FileArtifact, ArchiveError> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| self.error(format, anyhow::anyhow!("stat {}: {}", path.display(), e)))?
            .len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = file_name.split('.').next().unwrap_or_default().to_string();
        let inline_content = if self.inline_content {
            inline.unwrap_or_default()
        } else {
            String::new()
        };
        tracing::info!(format = format.label(), path = %path.display(), size_bytes, "Saved artifact");
        Ok(FileArtifact {
            title,
            download_path: path.to_string_lossy().into_owned(),
            size_bytes,
            format: format.label().to_string(),
            inline_content,
        })
    }
}

/// Persist one format.
pub async fn save(ctx: &SaveContext<'_>, format: Format) -> Result<FileArtifact, ArchiveError> {
    match format {
        Format::Html => html::save(ctx).await,
        Format::Markdown => markdown::save(ctx).await,
        Format::Pdf => pdf::save(ctx).await,
        Format::Mhtml => mhtml::save(ctx).await,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn article(content_html: &str) -> Article {
        Article {
            title: "Hello World".to_string(),
            author: "Ann Lee".to_string(),
            date: "2024-01-02".to_string(),
            tags: None,
            content_html: content_html.to_string(),
            css: "body{margin:0}".to_string(),
            base_url: "https://blog.csdn.net/ann/article/details/1".to_string(),
            platform_name: "CSDN".to_string(),
            platform_flag: "CSDN".to_string(),
        }
    }
}

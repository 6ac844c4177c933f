// ABOUTME: The Article record produced by extraction and consumed by the format serializers.
// ABOUTME: Carries normalized fields, processed content HTML and the combined stylesheet.

use serde::Serialize;

/// A fully extracted article, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub title: String,
    pub author: String,
    /// Canonical `YYYY-MM-DD`.
    pub date: String,
    pub tags: Option<String>,
    /// Content element HTML after image rewriting.
    pub content_html: String,
    /// Combined stylesheet: base, platform, inline and linked styles.
    pub css: String,
    /// The URL the article was archived from.
    pub base_url: String,
    /// Platform display name.
    pub platform_name: String,
    pub platform_flag: String,
}

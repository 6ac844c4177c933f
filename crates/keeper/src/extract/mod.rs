// ABOUTME: Field extraction for archived articles: selector evaluation, dates and stylesheets.
// ABOUTME: Turns a fetched document plus a platform strategy into an Article.

pub mod compiled;
pub mod date;
pub mod select;
pub mod styles;

use dom_query::Document;

use crate::article::Article;
use crate::error::ArchiveError;
use crate::fetch::ApiArticle;
use crate::platform::{Field, PlatformStrategy};

/// Title used when no title rule matches.
pub const UNKNOWN_TITLE: &str = "UnknownTitle";

/// Fields pulled out of an HTML page before images and styles are processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    pub title: String,
    pub author: String,
    pub date: String,
    /// Outer HTML of the content element.
    pub content_html: String,
    pub tags: Option<String>,
    /// Revealed inline `<style>` text.
    pub inline_css: String,
    /// Absolute URLs of linked stylesheets.
    pub stylesheet_links: Vec<String>,
}

/// Extract every field from an HTML page using the strategy's selector table.
///
/// Hidden blocks are revealed before the content element is captured. A missing
/// title falls back to [`UNKNOWN_TITLE`]; a title rule that matched empty text
/// or a missing content element is a parse error.
pub fn extract_fields(
    html: &str,
    url: &str,
    strategy: &PlatformStrategy,
) -> Result<ExtractedFields, ArchiveError> {
    let doc = Document::from(html);
    styles::reveal_hidden(&doc);

    let table = &strategy.selectors;
    let title = select::extract_text(&doc, table.rules(Field::Title), UNKNOWN_TITLE);
    if title.trim().is_empty() {
        return Err(ArchiveError::parse(
            url,
            "Extract",
            Some(anyhow::anyhow!("title element is empty")),
        ));
    }
    if title == UNKNOWN_TITLE {
        tracing::info!(%url, platform = %strategy.flag, "No title matched, using placeholder");
    }

    let author = select::extract_text(&doc, table.rules(Field::Author), "");
    let author = if author.trim().is_empty() {
        strategy.author_fallback().to_string()
    } else {
        author
    };

    let raw_date = select::extract_text(&doc, table.rules(Field::Date), "");
    let date = date::normalize_date(&raw_date, strategy.date_style);

    let content_html = select::extract_element_html(&doc, table.rules(Field::Content))
        .ok_or_else(|| {
            ArchiveError::parse(
                url,
                "Extract",
                Some(anyhow::anyhow!(
                    "no content element matched for {}",
                    strategy.name
                )),
            )
        })?;

    let tags = if table.has_rules(Field::Tag) {
        Some(select::extract_text(&doc, table.rules(Field::Tag), "")).filter(|t| !t.is_empty())
    } else {
        None
    };

    Ok(ExtractedFields {
        title,
        author,
        date,
        content_html,
        tags,
        inline_css: styles::inline_styles(&doc),
        stylesheet_links: styles::stylesheet_links(&doc, url),
    })
}

/// Fields from an API payload; only the content is required.
pub fn fields_from_api(
    api: ApiArticle,
    url: &str,
    strategy: &PlatformStrategy,
) -> Result<ExtractedFields, ArchiveError> {
    if api.content_html.trim().is_empty() {
        return Err(ArchiveError::parse(
            url,
            "Extract",
            Some(anyhow::anyhow!("API payload has no content")),
        ));
    }
    let title = if api.title.trim().is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        select::normalize_whitespace(&api.title)
    };
    let author = if api.author.trim().is_empty() {
        strategy.author_fallback().to_string()
    } else {
        api.author.clone()
    };
    let doc = Document::from(api.to_document().as_str());
    styles::reveal_hidden(&doc);
    let content_html = doc
        .select("div.Post-Content")
        .iter()
        .next()
        .map(|el| el.html().to_string())
        .unwrap_or_else(|| format!("<div class=\"Post-Content\">{}</div>", api.content_html));

    Ok(ExtractedFields {
        title,
        author,
        date: api.date.clone(),
        content_html,
        tags: None,
        inline_css: String::new(),
        stylesheet_links: Vec::new(),
    })
}

impl ExtractedFields {
    /// Finish an article once content has been image-processed and styles resolved.
    pub fn into_article(
        self,
        url: &str,
        strategy: &PlatformStrategy,
        content_html: String,
        css: String,
    ) -> Article {
        Article {
            title: self.title,
            author: self.author,
            date: self.date,
            tags: self.tags,
            content_html,
            css,
            base_url: url.to_string(),
            platform_name: strategy.name.clone(),
            platform_flag: strategy.flag.clone(),
        }
    }
}

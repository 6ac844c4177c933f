// ABOUTME: Stylesheet collection and hidden-content reveal for extracted article pages.
// ABOUTME: Gathers inline <style> text, linked stylesheet URLs and the base/platform stylesheets.

use std::path::Path;

use dom_query::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::platform::PlatformStrategy;

/// Embedded base stylesheet applied to every archived article.
pub const BASE_CSS: &str = include_str!("../../data/css/base.css");

/// Editor attributes some platforms use to hide or tag content blocks.
const EDITOR_ATTRS: &[&str] = &["data-mpa-powered-by", "data-tools", "data-w-e", "powered-by"];

static HIDDEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"visibility:\s*hidden").expect("valid regex"));
static TRANSPARENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)opacity:\s*0(?:\.0+)?(\s*[;}!]|\s*$)").expect("valid regex")
});

/// Rewrite CSS text so hidden or fully transparent blocks become visible.
pub fn reveal_css(css: &str) -> String {
    let visible = HIDDEN_RE.replace_all(css, "visibility: visible");
    TRANSPARENT_RE
        .replace_all(&visible, "opacity: 1${1}")
        .into_owned()
}

/// Make hidden `div`/`section` blocks visible and drop editor attributes, in place.
pub fn reveal_hidden(doc: &Document) {
    for el in doc.select("div, section").iter() {
        if let Some(style) = el.attr("style") {
            let revealed = reveal_css(&style);
            if revealed != style.as_ref() {
                el.set_attr("style", &revealed);
            }
        }
        for attr in EDITOR_ATTRS {
            if el.has_attr(attr) {
                el.remove_attr(attr);
            }
        }
    }
}

/// Text of every inline `<style>` block, revealed, one block per line group.
pub fn inline_styles(doc: &Document) -> String {
    let mut css = String::new();
    for style in doc.select("style").iter() {
        let text = style.text();
        if text.trim().is_empty() {
            continue;
        }
        css.push_str(&reveal_css(&text));
        css.push('\n');
    }
    css
}

/// Absolute URLs of `<link rel="stylesheet">` elements, resolved against `base_url`.
pub fn stylesheet_links(doc: &Document, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    doc.select("link[rel~=stylesheet][href]")
        .iter()
        .filter_map(|link| {
            let href = link.attr("href")?;
            let href = href.trim();
            if href.is_empty() {
                return None;
            }
            match &base {
                Some(b) => b.join(href).ok().map(|u| u.to_string()),
                None => Url::parse(href).ok().map(|u| u.to_string()),
            }
        })
        .collect()
}

async fn read_css(path: &Path) -> Option<String> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return None;
    }
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read stylesheet");
            None
        }
    }
}

/// Base stylesheet plus the platform's own stylesheet, if one exists.
///
/// With a stylesheet directory, `base.css` there replaces the embedded base and
/// `<flag>.css` is appended after a comment naming the platform.
pub async fn platform_css(stylesheet_dir: Option<&Path>, strategy: &PlatformStrategy) -> String {
    let Some(dir) = stylesheet_dir else {
        return BASE_CSS.to_string();
    };

    let mut css = read_css(&dir.join("base.css"))
        .await
        .unwrap_or_else(|| BASE_CSS.to_string());

    let platform_path = dir.join(format!("{}.css", strategy.flag));
    if let Some(extra) = read_css(&platform_path).await {
        css.push_str(&format!(
            "\n/* Platform specific styles for {} */\n{}",
            strategy.name, extra
        ));
    }
    css
}

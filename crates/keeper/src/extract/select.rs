// ABOUTME: Element extractor that evaluates ordered selector rules against a parsed document.
// ABOUTME: First matching rule wins; failing rules are logged and skipped, never fatal.

//! Rule-based element lookup.
//!
//! Key behaviors:
//! - Rules are tried in order; the first rule that finds an element wins, even
//!   if that element's text is empty.
//! - Tag rules match attribute values exactly, or as a regex search when the
//!   value contains one of `*?^$[](){}|`. `class` values match the whole class
//!   attribute or any single class token.
//! - A tag rule with a `class` constraint that found nothing gets a second pass
//!   matching the class value as a substring of any class token.
//! - A rule that cannot be evaluated (bad selector, bad pattern) counts as a miss.

use anyhow::anyhow;
use dom_query::{Document, Selection};
use regex::Regex;
use std::collections::BTreeMap;

use crate::extract::compiled::{get_or_compile, get_or_compile_pattern};
use crate::platform::SelectorRule;

const PATTERN_CHARS: &str = "*?^$[](){}|";

/// Whether an attribute value is treated as a regular expression.
pub fn is_pattern(value: &str) -> bool {
    value.chars().any(|c| PATTERN_CHARS.contains(c))
}

/// Normalizes whitespace in a string by collapsing runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum AttrMatch {
    Exact(String),
    Pattern(Regex),
}

impl AttrMatch {
    fn new(value: &str) -> anyhow::Result<Self> {
        if is_pattern(value) {
            get_or_compile_pattern(value)
                .map(AttrMatch::Pattern)
                .ok_or_else(|| anyhow!("invalid attribute pattern {:?}", value))
        } else {
            Ok(AttrMatch::Exact(value.to_string()))
        }
    }

    fn matches_one(&self, candidate: &str) -> bool {
        match self {
            AttrMatch::Exact(expected) => candidate == expected,
            AttrMatch::Pattern(re) => re.is_match(candidate),
        }
    }

    fn matches(&self, name: &str, value: &str) -> bool {
        if self.matches_one(value) {
            return true;
        }
        name == "class" && value.split_whitespace().any(|token| self.matches_one(token))
    }
}

fn class_contains(class_attr: &str, needle: &str, pattern: Option<&Regex>) -> bool {
    class_attr.split_whitespace().any(|token| match pattern {
        Some(re) => re.is_match(token),
        None => token.contains(needle),
    })
}

/// What a successful extraction yields.
pub enum Extracted<'a> {
    /// Whitespace-normalized text of the matched element.
    Text(String),
    /// The matched element itself.
    Element(Selection<'a>),
}

fn find_by_tag<'a>(
    doc: &'a Document,
    tag: &str,
    attrs: &BTreeMap<String, String>,
) -> anyhow::Result<Option<Selection<'a>>> {
    let tag_matcher = get_or_compile(tag).ok_or_else(|| anyhow!("invalid tag name {:?}", tag))?;
    let constraints = attrs
        .iter()
        .map(|(name, value)| Ok((name.as_str(), AttrMatch::new(value)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let candidates = doc.select_matcher(&tag_matcher);
    let hit = candidates.iter().find(|el| {
        constraints.iter().all(|(name, m)| {
            el.attr(name)
                .map(|value| m.matches(name, &value))
                .unwrap_or(false)
        })
    });
    if hit.is_some() {
        return Ok(hit);
    }

    if let Some(class) = attrs.get("class") {
        let pattern = if is_pattern(class) {
            get_or_compile_pattern(class)
        } else {
            None
        };
        let hit = candidates.iter().find(|el| {
            el.attr("class")
                .map(|value| class_contains(&value, class, pattern.as_ref()))
                .unwrap_or(false)
        });
        if hit.is_some() {
            tracing::debug!(tag, class = %class, "Matched element by partial class");
            return Ok(hit);
        }
    }

    Ok(None)
}

fn evaluate_rule<'a>(doc: &'a Document, rule: &SelectorRule) -> anyhow::Result<Option<Selection<'a>>> {
    match rule {
        SelectorRule::Css { css } => {
            let matcher =
                get_or_compile(css).ok_or_else(|| anyhow!("invalid CSS selector {:?}", css))?;
            Ok(doc.select_matcher(&matcher).iter().next())
        }
        SelectorRule::Tag { tag, attrs } => find_by_tag(doc, tag, attrs),
    }
}

/// Returns the first element matched by any rule, in rule order.
pub fn find_first<'a>(doc: &'a Document, rules: &[SelectorRule]) -> Option<Selection<'a>> {
    for rule in rules {
        match evaluate_rule(doc, rule) {
            Ok(Some(el)) => return Some(el),
            Ok(None) => tracing::debug!(%rule, "Selector rule matched nothing"),
            Err(e) => tracing::warn!(%rule, error = %e, "Selector rule failed"),
        }
    }
    None
}

/// Evaluates `rules` and returns the match as text or as the element.
///
/// Returns `None` when no rule matches; callers substitute their default.
pub fn extract<'a>(doc: &'a Document, rules: &[SelectorRule], want_text: bool) -> Option<Extracted<'a>> {
    let el = find_first(doc, rules)?;
    if want_text {
        Some(Extracted::Text(normalize_whitespace(&el.text())))
    } else {
        Some(Extracted::Element(el))
    }
}

/// Text of the first matching element, or `default` when nothing matches.
pub fn extract_text(doc: &Document, rules: &[SelectorRule], default: &str) -> String {
    match extract(doc, rules, true) {
        Some(Extracted::Text(text)) => text,
        Some(Extracted::Element(el)) => normalize_whitespace(&el.text()),
        None => default.to_string(),
    }
}

/// Outer HTML of the first matching element.
pub fn extract_element_html(doc: &Document, rules: &[SelectorRule]) -> Option<String> {
    match extract(doc, rules, false)? {
        Extracted::Element(el) => Some(el.html().to_string()),
        Extracted::Text(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_HTML: &str = r#"
        <html>
        <body>
            <h1 class="postTitle2 vertical-middle">  Full   Class  </h1>
            <a class="author_name" href="/u">Alice</a>
            <div class="index-module_popover_3kd8x">Popover Bob</div>
            <span id="post-12">12</span>
            <div id="cnblogs_post_body" class="blogpost-body"><p>Body <b>text</b></p></div>
            <div class="article-meta"><span>2024-01-02</span></div>
            <time>2023-05-06 08:00</time>
        </body>
        </html>
    "#;

    fn doc() -> Document {
        Document::from(SAMPLE_HTML)
    }

    #[test]
    fn returns_default_when_nothing_matches() {
        let rules = vec![
            SelectorRule::tag("h2", [("class", "missing")]),
            SelectorRule::css("section.none"),
        ];
        assert_eq!(extract_text(&doc(), &rules, "UnknownTitle"), "UnknownTitle");
        assert!(extract_element_html(&doc(), &rules).is_none());
    }

    #[test]
    fn second_rule_wins_when_first_misses() {
        let rules = vec![
            SelectorRule::tag("a", [("class", "nope")]),
            SelectorRule::tag("a", [("class", "author_name")]),
        ];
        assert_eq!(extract_text(&doc(), &rules, ""), "Alice");
    }

    #[test]
    fn first_matching_rule_wins_over_later_rules() {
        let rules = vec![
            SelectorRule::tag("time", Vec::<(String, String)>::new()),
            SelectorRule::tag("a", [("class", "author_name")]),
        ];
        assert_eq!(extract_text(&doc(), &rules, ""), "2023-05-06 08:00");
    }

    #[test]
    fn multi_token_class_matches_whole_attribute() {
        let rules = vec![SelectorRule::tag("h1", [("class", "postTitle2 vertical-middle")])];
        assert_eq!(extract_text(&doc(), &rules, ""), "Full Class");
    }

    #[test]
    fn single_class_token_matches_exactly() {
        let rules = vec![SelectorRule::tag("h1", [("class", "vertical-middle")])];
        assert_eq!(extract_text(&doc(), &rules, ""), "Full Class");
    }

    #[test]
    fn pattern_values_use_regex_search() {
        let rules = vec![SelectorRule::tag("span", [("id", r"post-\d+")])];
        assert_eq!(extract_text(&doc(), &rules, ""), "12");
    }

    #[test]
    fn partial_class_is_a_second_chance() {
        let rules = vec![SelectorRule::tag("div", [("class", "index-module_popover")])];
        assert_eq!(extract_text(&doc(), &rules, ""), "Popover Bob");
    }

    #[test]
    fn malformed_pattern_is_skipped() {
        let rules = vec![
            SelectorRule::tag("span", [("id", "post-(")]),
            SelectorRule::tag("a", [("class", "author_name")]),
        ];
        assert_eq!(extract_text(&doc(), &rules, "x"), "Alice");
    }

    #[test]
    fn invalid_css_is_skipped() {
        let rules = vec![
            SelectorRule::css("[[[broken"),
            SelectorRule::css("div.article-meta > span"),
        ];
        assert_eq!(extract_text(&doc(), &rules, ""), "2024-01-02");
    }

    #[test]
    fn element_extraction_keeps_markup() {
        let rules = vec![SelectorRule::tag("div", [("id", "cnblogs_post_body")])];
        let html = extract_element_html(&doc(), &rules).unwrap();
        assert!(html.starts_with("<div"), "expected outer html, got: {}", html);
        assert!(html.contains("<b>text</b>"), "expected inner markup, got: {}", html);
    }

    #[test]
    fn detects_pattern_characters() {
        assert!(is_pattern("a|b"));
        assert!(is_pattern("^x"));
        assert!(!is_pattern("plain-class_name"));
    }
}

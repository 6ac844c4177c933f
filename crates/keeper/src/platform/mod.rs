// ABOUTME: Platform strategy data model: selector rules, selector tables, fetch modes and date styles.
// ABOUTME: Strategies are plain records deserialized from JSON and merged with the base table once.

//! Per-platform extraction strategies.
//!
//! A platform is described by a [`PlatformSpec`] record (usually loaded from the
//! embedded `platforms.json`). Building a [`PlatformStrategy`] merges the
//! record's selector overrides into the base [`SelectorTable`]; after that the
//! strategy is immutable and shared behind an `Arc` by the registry.

pub mod loader;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic fields an article is extracted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Author,
    Content,
    Date,
    Tag,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Title,
        Field::Author,
        Field::Content,
        Field::Date,
        Field::Tag,
    ];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::Title => "title",
            Field::Author => "author",
            Field::Content => "content",
            Field::Date => "date",
            Field::Tag => "tag",
        };
        write!(f, "{}", s)
    }
}

/// A single extraction rule.
///
/// `Tag` rules name an element and the attributes it must carry. An attribute
/// value containing any of `*?^$[](){}|` is matched as a regular expression,
/// otherwise it must match exactly. A `class` constraint also gets a second
/// chance as a substring match against the element's class tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorRule {
    /// A CSS selector, e.g. `{"css": "div.article-meta > span"}`
    Css { css: String },
    /// A tag plus attribute constraints, e.g. `{"tag": "h1", "attrs": {"id": "page-title"}}`
    Tag {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
    },
}

impl SelectorRule {
    /// Convenience constructor for tag rules.
    pub fn tag<I, K, V>(tag: impl Into<String>, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SelectorRule::Tag {
            tag: tag.into(),
            attrs: attrs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Convenience constructor for CSS rules.
    pub fn css(css: impl Into<String>) -> Self {
        SelectorRule::Css { css: css.into() }
    }
}

impl fmt::Display for SelectorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorRule::Css { css } => write!(f, "css({})", css),
            SelectorRule::Tag { tag, attrs } => write!(f, "{}{:?}", tag, attrs),
        }
    }
}

/// Ordered rules per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorTable {
    fields: BTreeMap<Field, Vec<SelectorRule>>,
}

impl SelectorTable {
    /// The base table every platform starts from: every field present, no rules.
    pub fn base() -> Self {
        Self {
            fields: Field::ALL.iter().map(|f| (*f, Vec::new())).collect(),
        }
    }

    /// A new table where each field named in `overrides` takes the override's
    /// rule list and every other field keeps this table's rules.
    pub fn merged(&self, overrides: &BTreeMap<Field, Vec<SelectorRule>>) -> Self {
        let mut fields = self.fields.clone();
        for (field, rules) in overrides {
            fields.insert(*field, rules.clone());
        }
        Self { fields }
    }

    /// Rules for a field, empty when the field has none.
    pub fn rules(&self, field: Field) -> &[SelectorRule] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the table carries any rule for the field.
    pub fn has_rules(&self, field: Field) -> bool {
        !self.rules(field).is_empty()
    }
}

/// How a platform's date text is interpreted before falling back to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStyle {
    /// `YYYY-MM-DD HH:MM[:SS]` or `YYYY-MM-DD`.
    #[default]
    Standard,
    /// Relative terms and short numeric shapes (`HH:MM`, `昨天`, `MM/DD`, `YYYY/MM/DD`, `N days ago`).
    Relative,
    /// Year, month and day found anywhere in the text.
    Embedded,
    /// `M 月 D 日` in the current year.
    MonthDay,
}

fn default_warmup_delay() -> [u64; 2] {
    [500, 1500]
}

fn default_id_placeholder() -> String {
    "article_id".to_string()
}

/// JSON API fetch description: which configured endpoint to call and where the fields live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSpec {
    /// Endpoint name looked up in the platform's configuration section.
    pub endpoint: String,
    /// Placeholder the last URL path segment is substituted into.
    #[serde(default = "default_id_placeholder")]
    pub id_placeholder: String,
    /// JSON pointers (RFC 6901) into the payload.
    pub title: String,
    pub author: String,
    pub content: String,
    pub date: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// How the raw document for an article is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FetchMode {
    /// GET the article page, optionally after warm-up requests that collect session cookies.
    Direct {
        #[serde(default)]
        warmup: Vec<String>,
        /// Inclusive range, in milliseconds, of the pause before each follow-up request.
        #[serde(default = "default_warmup_delay")]
        warmup_delay_ms: [u64; 2],
    },
    /// Call a JSON API instead of scraping the page.
    Api(ApiSpec),
}

impl Default for FetchMode {
    fn default() -> Self {
        FetchMode::Direct {
            warmup: Vec::new(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

/// A platform record as written in the platform table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSpec {
    /// Display name, used in folder and file names.
    pub name: String,
    /// Stable identifier, used for configuration and stylesheet lookups.
    pub flag: String,
    /// Host substrings this platform handles.
    pub domains: Vec<String>,
    #[serde(default)]
    pub selectors: BTreeMap<Field, Vec<SelectorRule>>,
    #[serde(default)]
    pub fetch: FetchMode,
    #[serde(default)]
    pub date_style: DateStyle,
    #[serde(default)]
    pub default_author: Option<String>,
    /// Decode page bodies as UTF-8 regardless of the declared charset.
    #[serde(default)]
    pub force_utf8: bool,
    /// Extra request headers sent with every request for this platform.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// An immutable, fully merged platform strategy.
#[derive(Debug, Clone)]
pub struct PlatformStrategy {
    pub name: String,
    pub flag: String,
    pub domains: Vec<String>,
    pub selectors: SelectorTable,
    pub fetch: FetchMode,
    pub date_style: DateStyle,
    pub default_author: Option<String>,
    pub force_utf8: bool,
    pub headers: BTreeMap<String, String>,
}

impl PlatformStrategy {
    /// Build a strategy by merging the record's selector overrides into `base`.
    pub fn from_spec(spec: PlatformSpec, base: &SelectorTable) -> Self {
        Self {
            selectors: base.merged(&spec.selectors),
            name: spec.name,
            flag: spec.flag,
            domains: spec.domains,
            fetch: spec.fetch,
            date_style: spec.date_style,
            default_author: spec.default_author,
            force_utf8: spec.force_utf8,
            headers: spec.headers,
        }
    }

    /// Author used when no author rule matches.
    pub fn author_fallback(&self) -> &str {
        self.default_author.as_deref().unwrap_or("UnknownAuthor")
    }

    pub fn is_api(&self) -> bool {
        matches!(self.fetch, FetchMode::Api(_))
    }
}

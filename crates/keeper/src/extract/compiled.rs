// ABOUTME: Process-wide caches of compiled CSS matchers and attribute regexes.
// ABOUTME: Invalid selectors and patterns are cached as None so they fail fast on reuse.

//! Selector and pattern caching.
//!
//! Selector tables are evaluated for every article, so CSS selectors and
//! attribute patterns are compiled once and shared across threads.

use std::collections::HashMap;
use std::sync::RwLock;

use dom_query::Matcher;
use once_cell::sync::Lazy;
use regex::Regex;

static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Matcher>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static PATTERN_CACHE: Lazy<RwLock<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn cached<T: Clone>(
    cache: &RwLock<HashMap<String, Option<T>>>,
    key: &str,
    compile: impl FnOnce(&str) -> Option<T>,
) -> Option<T> {
    {
        let guard = cache.read().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = guard.get(key) {
            return hit.clone();
        }
    }

    let compiled = compile(key);
    let mut guard = cache.write().unwrap_or_else(|e| e.into_inner());
    guard
        .entry(key.to_string())
        .or_insert(compiled)
        .clone()
}

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `None` if the selector is invalid.
pub fn get_or_compile(css: &str) -> Option<Matcher> {
    cached(&SELECTOR_CACHE, css, |s| Matcher::new(s).ok())
}

/// Gets or compiles an attribute pattern, caching the result.
///
/// Returns `None` if the pattern is not a valid regular expression.
pub fn get_or_compile_pattern(pattern: &str) -> Option<Regex> {
    cached(&PATTERN_CACHE, pattern, |p| Regex::new(p).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_selector_is_cached() {
        assert!(get_or_compile("div.container").is_some());
        assert!(get_or_compile("div.container").is_some());
    }

    #[test]
    fn invalid_selector_returns_none() {
        assert!(get_or_compile("[[[invalid").is_none());
        assert!(get_or_compile("[[[invalid").is_none());
    }

    #[test]
    fn patterns_compile_once() {
        let re = get_or_compile_pattern(r"^post-\d+$").unwrap();
        assert!(re.is_match("post-12"));
        assert!(get_or_compile_pattern("(unclosed").is_none());
    }
}

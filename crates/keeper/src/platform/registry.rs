// ABOUTME: Platform registry mapping host substrings to immutable platform strategies.
// ABOUTME: Resolution scans entries in insertion order; the first domain contained in the host wins.

use std::sync::Arc;

use url::Url;

use crate::error::ArchiveError;
use crate::platform::{PlatformSpec, PlatformStrategy, SelectorTable};

/// Registry of platform strategies keyed by domain substring.
///
/// Built once and read-only afterwards; clones share the strategies.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    base: SelectorTable,
    entries: Vec<(String, Arc<PlatformStrategy>)>,
}

impl PlatformRegistry {
    /// Create an empty registry over the base selector table.
    pub fn new() -> Self {
        Self {
            base: SelectorTable::base(),
            entries: Vec::new(),
        }
    }

    /// Register a platform under each of its domains.
    pub fn register(&mut self, spec: PlatformSpec) {
        let strategy = Arc::new(PlatformStrategy::from_spec(spec, &self.base));
        for domain in &strategy.domains {
            self.entries
                .push((domain.to_lowercase(), Arc::clone(&strategy)));
        }
    }

    /// Route an additional domain to an already registered platform.
    ///
    /// Returns false if no platform with that flag exists.
    pub fn alias(&mut self, domain: impl Into<String>, flag: &str) -> bool {
        let found = self
            .entries
            .iter()
            .find(|(_, s)| s.flag == flag)
            .map(|(_, s)| Arc::clone(s));
        match found {
            Some(strategy) => {
                self.entries.push((domain.into().to_lowercase(), strategy));
                true
            }
            None => false,
        }
    }

    /// Strategy for a URL.
    ///
    /// Fails with `InvalidUrl` for malformed input and with
    /// `UnsupportedPlatform` when no registered domain is part of the host.
    pub fn resolve(&self, url: &str) -> Result<Arc<PlatformStrategy>, ArchiveError> {
        let parsed = Url::parse(url).map_err(|e| {
            ArchiveError::invalid_url(url, "Resolve", Some(anyhow::anyhow!("invalid URL: {}", e)))
        })?;
        let host = parsed
            .host_str()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| {
                ArchiveError::invalid_url(url, "Resolve", Some(anyhow::anyhow!("URL has no host")))
            })?;

        self.entries
            .iter()
            .find(|(domain, _)| host.contains(domain.as_str()))
            .map(|(_, strategy)| Arc::clone(strategy))
            .ok_or_else(|| ArchiveError::unsupported_platform(url, host, self.supported_names()))
    }

    /// Strategy registered with the given flag.
    pub fn get(&self, flag: &str) -> Option<Arc<PlatformStrategy>> {
        self.entries
            .iter()
            .find(|(_, s)| s.flag == flag)
            .map(|(_, s)| Arc::clone(s))
    }

    /// Display names of all platforms, in registration order, without duplicates.
    pub fn supported_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, strategy) in &self.entries {
            if !names.contains(&strategy.name) {
                names.push(strategy.name.clone());
            }
        }
        names
    }

    /// Registered domains in resolution order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(d, _)| d.as_str())
    }

    /// Returns the number of registered domains.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no domains are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, flag: &str, domains: &[&str]) -> PlatformSpec {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "flag": flag,
            "domains": domains,
        }))
        .unwrap()
    }

    #[test]
    fn resolves_by_host_substring() {
        let mut reg = PlatformRegistry::new();
        reg.register(spec("CSDN", "CSDN", &["blog.csdn.net"]));
        let strategy = reg
            .resolve("https://blog.csdn.net/x/article/details/1")
            .unwrap();
        assert_eq!(strategy.flag, "CSDN");
    }

    #[test]
    fn first_registered_domain_wins_on_overlap() {
        let mut reg = PlatformRegistry::new();
        reg.register(spec("First", "first", &["example.com"]));
        reg.register(spec("Second", "second", &["blog.example.com"]));
        let strategy = reg.resolve("https://blog.example.com/p").unwrap();
        assert_eq!(strategy.flag, "first");
    }

    #[test]
    fn unknown_host_lists_supported_platforms() {
        let mut reg = PlatformRegistry::new();
        reg.register(spec("CSDN", "CSDN", &["blog.csdn.net"]));
        reg.register(spec("简书", "jianshu", &["jianshu.com"]));
        let err = reg
            .resolve("https://unknown.example.com/post/1")
            .expect_err("unknown domain must fail");
        assert!(err.is_unsupported_platform());
        assert_eq!(err.domain.as_deref(), Some("unknown.example.com"));
        assert_eq!(err.supported_platforms, vec!["CSDN", "简书"]);
    }

    #[test]
    fn malformed_url_is_invalid() {
        let reg = PlatformRegistry::new();
        let err = reg.resolve("not a url").expect_err("should fail");
        assert!(err.is_invalid_url());
    }

    #[test]
    fn alias_routes_to_existing_strategy() {
        let mut reg = PlatformRegistry::new();
        reg.register(spec("CSDN", "CSDN", &["blog.csdn.net"]));
        assert!(reg.alias("127.0.0.1", "CSDN"));
        assert!(!reg.alias("localhost", "missing"));
        let strategy = reg.resolve("http://127.0.0.1:8080/a").unwrap();
        assert_eq!(strategy.name, "CSDN");
        assert_eq!(reg.supported_names(), vec!["CSDN"]);
    }
}

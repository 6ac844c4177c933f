// ABOUTME: Read-only platform configuration store keyed by platform flag.
// ABOUTME: Supplies headers, cookies, retry policy, timeouts and API endpoint templates.

//! Platform configuration store.
//!
//! The store is loaded once (from a JSON file or string) and handed to the
//! archiver; lookups never mutate it. A `common` section provides defaults
//! that per-platform sections may override.
//!
//! ```json
//! {
//!   "common": { "user_agents": ["Mozilla/5.0 ..."], "retry_times": 3 },
//!   "zhihu": {
//!     "cookies": { "z_c0": "..." },
//!     "endpoints": { "web_api": "https://api.zhihu.com/articles/{article_id}" }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

fn default_retry_times() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Settings shared by every platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(default)]
    pub user_agents: Vec<String>,
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            user_agents: Vec::new(),
            retry_times: default_retry_times(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Settings for a single platform flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub retry_times: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// How many times to attempt a request and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// The configuration store handed to the archiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigStore {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(flatten)]
    pub platforms: HashMap<String, PlatformConfig>,
}

impl ConfigStore {
    /// Parse a store from JSON text.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid platform configuration")
    }

    /// Load a store from a JSON file.
    ///
    /// A missing file is not an error: the defaults are returned and a warning logged.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let store = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.display(), platforms = store.platforms.len(), "Loaded configuration");
        Ok(store)
    }

    /// Section for a platform flag, if one is configured.
    pub fn platform(&self, flag: &str) -> Option<&PlatformConfig> {
        self.platforms.get(flag)
    }

    /// Retry policy for a platform; attempts is never below one.
    pub fn retry_policy(&self, flag: &str) -> RetryPolicy {
        let section = self.platform(flag);
        let attempts = section
            .and_then(|p| p.retry_times)
            .unwrap_or(self.common.retry_times)
            .max(1);
        let delay_ms = section
            .and_then(|p| p.retry_delay_ms)
            .unwrap_or(self.common.retry_delay_ms);
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Request timeout for a platform.
    pub fn timeout(&self, flag: &str) -> Duration {
        let secs = self
            .platform(flag)
            .and_then(|p| p.timeout_secs)
            .unwrap_or(self.common.timeout_secs);
        Duration::from_secs(secs)
    }

    /// A random entry of `common.user_agents`, if any are configured.
    pub fn random_user_agent(&self) -> Option<String> {
        self.common
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    /// Configured headers for a platform.
    pub fn headers(&self, flag: &str) -> BTreeMap<String, String> {
        self.platform(flag)
            .map(|p| p.headers.clone())
            .unwrap_or_default()
    }

    /// Configured cookies rendered as a `Cookie` header value.
    pub fn cookie_header(&self, flag: &str) -> Option<String> {
        let cookies = &self.platform(flag)?.cookies;
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Resolve an endpoint template, substituting `{name}` placeholders from `vars`.
    ///
    /// Returns `None` when the endpoint is not configured or a placeholder has no value.
    pub fn endpoint(&self, flag: &str, name: &str, vars: &[(&str, &str)]) -> Option<String> {
        let template = self.platform(flag)?.endpoints.get(name)?;
        let mut resolved = template.clone();
        for (key, value) in vars {
            resolved = resolved.replace(&format!("{{{}}}", key), value);
        }
        if resolved.contains('{') && resolved.contains('}') {
            tracing::error!(platform = flag, endpoint = name, template = %template, "Endpoint template has unfilled placeholders");
            return None;
        }
        Some(resolved)
    }
}
